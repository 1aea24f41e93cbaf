// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Heuristic room analyzer
//!
//! CPU-only feature extraction from pixel statistics. Produces plain detection
//! labels (`white surfaces`, `wood elements`), derived `kind:value` facts
//! (`lighting:dim`, `space:spacious`), the dominant colour palette
//! (`color:#rrggbb`, confidence is the colour's share of the image) and, when
//! detections match a known room signature, a `room:<type>` observation.

use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use std::time::Instant;
use tracing::{debug, info};

use super::image_utils::decode_image_bytes;
use super::{FeatureExtractor, ImageObservation, VisionError};

/// Objects that identify each room type
pub const ROOM_SIGNATURES: &[(&str, &[&str])] = &[
    ("bathroom", &["toilet", "sink", "bathtub", "shower", "mirror", "towel"]),
    (
        "kitchen",
        &["refrigerator", "oven", "microwave", "sink", "dining table", "chair"],
    ),
    ("bedroom", &["bed", "pillow", "nightstand", "dresser", "lamp"]),
    (
        "living_room",
        &["couch", "tv", "coffee table", "chair", "lamp", "rug"],
    ),
    ("dining_room", &["dining table", "chair", "chandelier"]),
    ("office", &["desk", "chair", "computer", "monitor", "keyboard"]),
    ("garage", &["car", "tools", "workbench", "bicycle"]),
    ("basement", &["storage boxes", "furnace", "water heater"]),
];

const DETECTION_CONFIDENCE: f32 = 0.6;
const FEATURE_CONFIDENCE: f32 = 0.7;
/// Longest side used for pixel statistics
const ANALYSIS_SIZE: u32 = 512;
/// Colours reported per image
const PALETTE_SIZE: usize = 5;
/// Side of the square resample clustered for the palette
const PALETTE_SAMPLE: u32 = 150;
const KMEANS_ITERATIONS: usize = 10;

/// Pick the room type whose signature matches the most labels
///
/// Returns `None` when nothing matches. Ties go to the earlier entry in
/// [`ROOM_SIGNATURES`].
pub fn classify_room<S: AsRef<str>>(labels: &[S]) -> Option<(&'static str, usize)> {
    let mut best: Option<(&'static str, usize)> = None;

    for (room, signature) in ROOM_SIGNATURES {
        let score = labels
            .iter()
            .filter(|label| {
                let label = label.as_ref().to_lowercase();
                signature.iter().any(|object| label.contains(object))
            })
            .count();

        if score > 0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((room, score));
        }
    }

    best
}

#[derive(Debug, Clone, Copy)]
struct PixelStats {
    brightness: f64,
    contrast: f64,
    avg_color: [f64; 3],
    sharpness: f64,
}

fn pixel_stats(img: &DynamicImage) -> PixelStats {
    let sample = if img.width() > ANALYSIS_SIZE || img.height() > ANALYSIS_SIZE {
        img.thumbnail(ANALYSIS_SIZE, ANALYSIS_SIZE)
    } else {
        img.clone()
    };
    let rgb = sample.to_rgb8();

    let mut sums = [0f64; 3];
    let mut sum_sq = 0f64;
    let pixel_count = (rgb.width() as f64 * rgb.height() as f64).max(1.0);

    for pixel in rgb.pixels() {
        for (channel, value) in pixel.0.iter().enumerate() {
            let v = *value as f64;
            sums[channel] += v;
            sum_sq += v * v;
        }
    }

    let value_count = pixel_count * 3.0;
    let brightness = (sums[0] + sums[1] + sums[2]) / value_count;
    let variance = (sum_sq / value_count - brightness * brightness).max(0.0);
    let avg_color = [
        sums[0] / pixel_count,
        sums[1] / pixel_count,
        sums[2] / pixel_count,
    ];

    PixelStats {
        brightness,
        contrast: variance.sqrt(),
        avg_color,
        sharpness: laplacian_variance(&sample),
    }
}

/// Variance of the 4-neighbour Laplacian over the grayscale image
fn laplacian_variance(img: &DynamicImage) -> f64 {
    let gray = img.to_luma8();
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f64;
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    let mut count = 0f64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += lap;
            sum_sq += lap * lap;
            count += 1.0;
        }
    }

    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

fn detect_labels(stats: &PixelStats, width: u32, height: u32) -> Vec<&'static str> {
    let mut detected = Vec::new();

    if stats.brightness < 100.0 {
        detected.push("dim lighting");
    }

    let aspect = width as f64 / height.max(1) as f64;
    if aspect > 1.5 {
        detected.push("horizontal fixtures");
    }

    let [r, g, b] = stats.avg_color;
    if r > 200.0 && g > 200.0 && b > 200.0 {
        detected.extend(["white surfaces", "clean space"]);
    }
    if r > 100.0 && g > 80.0 && b < 70.0 {
        detected.push("wood elements");
    }

    if detected.is_empty() {
        detected.push("general room features");
    }
    detected
}

fn feature_labels(stats: &PixelStats) -> [String; 4] {
    let lighting = if stats.brightness > 150.0 {
        "bright"
    } else if stats.brightness < 100.0 {
        "dim"
    } else {
        "moderate"
    };
    let contrast = if stats.contrast > 60.0 { "high" } else { "low" };
    let quality = if stats.sharpness > 100.0 { "sharp" } else { "blurry" };
    let space = if stats.brightness > 140.0 {
        "spacious"
    } else {
        "compact"
    };

    [
        format!("lighting:{}", lighting),
        format!("contrast:{}", contrast),
        format!("quality:{}", quality),
        format!("space:{}", space),
    ]
}

fn luma(pixel: &[f64; 3]) -> f64 {
    0.299 * pixel[0] + 0.587 * pixel[1] + 0.114 * pixel[2]
}

fn nearest(centers: &[[f64; 3]], pixel: &[f64; 3]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let distance: f64 = (0..3).map(|c| (center[c] - pixel[c]).powi(2)).sum();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Up to `k` dominant colours with their share of the image, largest first
///
/// K-means over a 150x150 nearest-neighbour resample. Seeds are taken at
/// evenly spaced luminance quantiles, so the result is deterministic.
pub fn dominant_colors(img: &DynamicImage, k: usize) -> Vec<([u8; 3], f32)> {
    let sample = img
        .resize_exact(PALETTE_SAMPLE, PALETTE_SAMPLE, FilterType::Nearest)
        .to_rgb8();
    let pixels: Vec<[f64; 3]> = sample
        .pixels()
        .map(|p| [p.0[0] as f64, p.0[1] as f64, p.0[2] as f64])
        .collect();
    if pixels.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut by_luma = pixels.clone();
    by_luma.sort_by(|a, b| luma(a).total_cmp(&luma(b)));
    let mut centers: Vec<[f64; 3]> = (0..k)
        .map(|i| by_luma[(2 * i + 1) * by_luma.len() / (2 * k)])
        .collect();

    let mut assignments = vec![0usize; pixels.len()];
    for iteration in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (pixel, slot) in pixels.iter().zip(assignments.iter_mut()) {
            let cluster = nearest(&centers, pixel);
            if cluster != *slot {
                *slot = cluster;
                changed = true;
            }
        }
        if iteration > 0 && !changed {
            break;
        }

        let mut sums = vec![[0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (pixel, &cluster) in pixels.iter().zip(&assignments) {
            for c in 0..3 {
                sums[cluster][c] += pixel[c];
            }
            counts[cluster] += 1;
        }
        for (center, (sum, count)) in centers.iter_mut().zip(sums.iter().zip(&counts)) {
            if *count > 0 {
                let n = *count as f64;
                *center = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }
    }

    // Clusters that converge on the same colour are reported once
    let mut palette: Vec<([u8; 3], usize)> = Vec::new();
    for (cluster, center) in centers.iter().enumerate() {
        let count = assignments.iter().filter(|&&a| a == cluster).count();
        if count == 0 {
            continue;
        }
        let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        let color = [channel(center[0]), channel(center[1]), channel(center[2])];
        match palette.iter_mut().find(|(existing, _)| *existing == color) {
            Some((_, total)) => *total += count,
            None => palette.push((color, count)),
        }
    }
    palette.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let total = pixels.len() as f32;
    palette
        .into_iter()
        .map(|(color, count)| (color, count as f32 / total))
        .collect()
}

/// Analyze a decoded image
pub fn analyze_image(img: &DynamicImage) -> Vec<ImageObservation> {
    let stats = pixel_stats(img);
    let detected = detect_labels(&stats, img.width(), img.height());

    let mut observations = Vec::with_capacity(detected.len() + 5 + PALETTE_SIZE);
    if let Some((room, score)) = classify_room(&detected) {
        let confidence = score as f32 / detected.len() as f32;
        observations.push(ImageObservation::new(format!("room:{}", room), confidence));
    }
    observations.extend(
        detected
            .iter()
            .map(|label| ImageObservation::new(*label, DETECTION_CONFIDENCE)),
    );
    observations.extend(
        feature_labels(&stats)
            .into_iter()
            .map(|label| ImageObservation::new(label, FEATURE_CONFIDENCE)),
    );
    observations.extend(
        dominant_colors(img, PALETTE_SIZE)
            .into_iter()
            .map(|([r, g, b], share)| {
                ImageObservation::new(format!("color:#{:02x}{:02x}{:02x}", r, g, b), share)
            }),
    );

    debug!(
        "Image stats: brightness={:.1} contrast={:.1} sharpness={:.1}",
        stats.brightness, stats.contrast, stats.sharpness
    );
    observations
}

/// Feature extractor backed by pixel heuristics
#[derive(Debug, Default, Clone)]
pub struct HeuristicRoomAnalyzer;

impl HeuristicRoomAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FeatureExtractor for HeuristicRoomAnalyzer {
    async fn extract_features(&self, image: &[u8]) -> Result<Vec<ImageObservation>, VisionError> {
        let start = Instant::now();
        let bytes = image.to_vec();

        let observations = tokio::task::spawn_blocking(move || -> Result<_, VisionError> {
            let (img, info) = decode_image_bytes(&bytes)?;
            debug!(
                "Decoded {:?} image {}x{} ({} bytes)",
                info.format, info.width, info.height, info.size_bytes
            );
            Ok(analyze_image(&img))
        })
        .await
        .map_err(|e| VisionError::Extraction(e.to_string()))??;

        info!(
            "Extracted {} observations in {}ms",
            observations.len(),
            start.elapsed().as_millis()
        );
        Ok(observations)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}
