// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use remodel_rag::conversation::ConversationTurn;
use remodel_rag::embeddings::{SubwordVocabulary, DEFAULT_VOCABULARY_WORDS};
use remodel_rag::rag::{AssemblyConfig, BudgetUnit, ContextAssembler, PromptContext};
use remodel_rag::vector::{Document, Metadata, QueryResult};
use remodel_rag::vision::ImageObservation;
use std::sync::Arc;

fn passages() -> Vec<QueryResult> {
    let texts = [
        "Most bathroom remodels take two to three weeks from demolition to final walkthrough.",
        "We install porcelain, ceramic and natural stone tile with waterproof membranes behind every shower wall.",
        "Vanity upgrades include soft-close drawers, undermount sinks and quartz tops.",
        "Heated floors add comfort and can be installed under most tile.",
        "Permits are pulled by our office and inspections are scheduled for you.",
    ];
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| QueryResult {
            document: Document {
                id: Document::id_for_position(i),
                text: text.to_string(),
                metadata: Metadata::new(),
                embedding: vec![1.0],
            },
            score: 1.0 - i as f32 * 0.1,
        })
        .collect()
}

fn history() -> Vec<ConversationTurn> {
    vec![
        ConversationTurn::user("Do you remodel bathrooms?"),
        ConversationTurn::assistant("Yes, full and partial bathroom remodels."),
        ConversationTurn::user("How long does it take?"),
    ]
}

fn size(context: &PromptContext, unit: BudgetUnit) -> usize {
    context
        .retrieved
        .iter()
        .map(|r| unit.measure(&r.document.text))
        .chain(context.history.iter().map(|t| unit.measure(&t.text)))
        .sum()
}

#[test]
fn test_budget_never_exceeded() {
    for unit in [BudgetUnit::Characters, BudgetUnit::Tokens, BudgetUnit::Subwords] {
        let assembler = ContextAssembler::new(AssemblyConfig {
            unit,
            min_fragment: 5,
            max_history_turns: 6,
        });
        for budget in 0..=600 {
            let context = assembler.assemble("q", &passages(), &history(), &[], budget);
            let measured = size(&context, unit);
            assert!(measured <= budget, "{} > {} ({})", measured, budget, unit);
            assert_eq!(measured, context.used);
        }
    }
}

#[test]
fn test_smaller_budget_never_includes_more_documents() {
    for unit in [BudgetUnit::Characters, BudgetUnit::Tokens, BudgetUnit::Subwords] {
        let assembler = ContextAssembler::new(AssemblyConfig {
            unit,
            min_fragment: 10,
            max_history_turns: 6,
        });
        let mut previous = usize::MAX;
        for budget in (0..=600).rev() {
            let count = assembler
                .assemble("q", &passages(), &history(), &[], budget)
                .retrieved
                .len();
            assert!(count <= previous, "budget {} included {} > {}", budget, count, previous);
            previous = count;
        }
    }
}

#[test]
fn test_observations_exempt_from_budget() {
    let observations: Vec<ImageObservation> = (0..20)
        .map(|i| ImageObservation::new(format!("fixture number {}", i), 0.9))
        .collect();
    let context = ContextAssembler::default().assemble("q", &passages(), &[], &observations, 50);
    assert_eq!(context.observations.len(), 20);
    assert!(context.used <= 50);
}

#[test]
fn test_history_dropped_before_passages() {
    let context = ContextAssembler::new(AssemblyConfig {
        unit: BudgetUnit::Characters,
        min_fragment: 80,
        max_history_turns: 6,
    })
    .assemble("q", &passages()[..1], &history(), &[], 110);

    assert_eq!(context.retrieved.len(), 1);
    // 84 chars of passage leave room for the newest turn only
    assert_eq!(context.history.len(), 1);
    assert_eq!(context.history[0].text, "How long does it take?");
}

#[test]
fn test_subword_budget_with_learned_vocabulary() {
    let corpus = passages();
    let vocabulary =
        SubwordVocabulary::build(corpus.iter().map(|r| r.document.text.as_str()), DEFAULT_VOCABULARY_WORDS);
    let assembler = ContextAssembler::with_subwords(
        AssemblyConfig {
            unit: BudgetUnit::Subwords,
            min_fragment: 3,
            max_history_turns: 6,
        },
        Arc::new(vocabulary),
    );

    // Every passage word is in the vocabulary, so the first passage is
    // 13 words plus the final period
    assert_eq!(assembler.measure(&corpus[0].document.text), 14);

    for budget in 0..=200 {
        let context = assembler.assemble("q", &corpus, &history(), &[], budget);
        let measured: usize = context
            .retrieved
            .iter()
            .map(|r| assembler.measure(&r.document.text))
            .chain(context.history.iter().map(|t| assembler.measure(&t.text)))
            .sum();
        assert!(measured <= budget);
        assert_eq!(measured, context.used);
    }
}

#[test]
fn test_character_truncation_ends_on_word() {
    let assembler = ContextAssembler::new(AssemblyConfig {
        unit: BudgetUnit::Characters,
        min_fragment: 10,
        max_history_turns: 0,
    });
    let context = assembler.assemble("q", &passages()[..1], &[], &[], 30);
    assert_eq!(context.retrieved[0].document.text, "Most bathroom remodels take");
    assert_eq!(context.used, 27);
}
