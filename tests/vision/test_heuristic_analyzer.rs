// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use remodel_rag::vision::{FeatureExtractor, HeuristicRoomAnalyzer, VisionError};
use std::io::Cursor;

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
}

#[tokio::test]
async fn test_bright_white_room_from_png() {
    let analyzer = HeuristicRoomAnalyzer::new();
    let bytes = encode(solid(32, 32, [235, 235, 240]), ImageFormat::Png);

    let observations = analyzer.extract_features(&bytes).await.unwrap();
    let labels: Vec<&str> = observations.iter().map(|o| o.label.as_str()).collect();

    assert!(labels.contains(&"white surfaces"));
    assert!(labels.contains(&"lighting:bright"));
    assert!(observations
        .iter()
        .all(|o| (0.0..=1.0).contains(&o.confidence)));
}

#[tokio::test]
async fn test_dark_room_from_jpeg() {
    let analyzer = HeuristicRoomAnalyzer::new();
    let bytes = encode(solid(90, 30, [25, 20, 20]), ImageFormat::Jpeg);

    let observations = analyzer.extract_features(&bytes).await.unwrap();
    let labels: Vec<&str> = observations.iter().map(|o| o.label.as_str()).collect();

    assert!(labels.contains(&"dim lighting"));
    assert!(labels.contains(&"horizontal fixtures"));
    assert!(labels.contains(&"space:compact"));
}

#[tokio::test]
async fn test_unsupported_bytes_fail() {
    let analyzer = HeuristicRoomAnalyzer::new();
    assert!(matches!(
        analyzer.extract_features(&[]).await,
        Err(VisionError::Image(_))
    ));
    assert!(matches!(
        analyzer.extract_features(b"GIF").await,
        Err(VisionError::Image(_))
    ));
}

#[tokio::test]
async fn test_palette_reported_as_color_observations() {
    let analyzer = HeuristicRoomAnalyzer::new();
    let bytes = encode(solid(24, 24, [150, 100, 50]), ImageFormat::Png);

    let observations = analyzer.extract_features(&bytes).await.unwrap();
    let palette: Vec<_> = observations
        .iter()
        .filter(|o| o.label.starts_with("color:#"))
        .collect();
    assert_eq!(palette.len(), 1);
    assert_eq!(palette[0].label, "color:#966432");
    assert_eq!(palette[0].search_term(), "#966432");
}
