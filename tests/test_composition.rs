//! Integration test: ensembles nested inside ensembles

mod common;

use common::{binary_data, Column, Constant, Majority, Threshold};
use kolosal_ensemble::ensemble::{
    BestLearner, BestLearnerConfig, StackConfig, StackEnsemble, VoteEnsemble,
};
use kolosal_ensemble::optimizer::{OptionPath, ParameterGrid, ParameterValue};
use kolosal_ensemble::training::{CVStrategy, Learner};
use kolosal_ensemble::{KolosalError, Stage};
use ndarray::array;

fn stack_of_columns() -> StackEnsemble {
    StackEnsemble::new(StackConfig {
        stacker_training_proportion: 0.5,
        random_state: Some(5),
        ..Default::default()
    })
    .add_learner(Column(0))
    .add_learner(Column(1))
    .with_stacker(Majority::default())
}

#[test]
fn test_vote_over_stack_and_selector() {
    let (x, y) = binary_data();
    let selector = BestLearner::new(BestLearnerConfig {
        partition: CVStrategy::KFold { n_splits: 2, shuffle: false },
        ..Default::default()
    })
    .add_learner(Column(0))
    .add_learner(Column(1));

    let mut vote = VoteEnsemble::new(Vec::new())
        .add_learner(stack_of_columns())
        .add_learner(selector)
        .add_learner(Column(0));

    vote.fit(&x, &y).expect("nested fit should succeed");
    let preds = vote.transform(&x).unwrap();
    assert_eq!(preds.len(), x.nrows());
    // The selector picks column 0, which equals the labels, as does the
    // third learner, so they outvote the stack
    assert_eq!(preds, y);
}

#[test]
fn test_stack_of_votes() {
    let (x, y) = binary_data();
    let inner = VoteEnsemble::new(vec![Box::new(Column(0)), Box::new(Column(0)), Box::new(Column(1))]);
    let mut stack = StackEnsemble::new(StackConfig {
        stacker_training_proportion: 0.5,
        random_state: Some(1),
        ..Default::default()
    })
    .add_learner(inner)
    .add_learner(Constant(1.0))
    .with_stacker(Majority::default());

    stack.fit(&x, &y).unwrap();
    assert_eq!(stack.transform(&x).unwrap().len(), x.nrows());
}

#[test]
fn test_set_option_routes_through_nesting() {
    let x = array![[0.1], [0.9], [0.2], [0.8], [0.3], [0.7]];
    let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
    let selector = BestLearner::new(BestLearnerConfig {
        partition: CVStrategy::KFold { n_splits: 3, shuffle: false },
        ..Default::default()
    })
    .add_learner(Threshold { threshold: 0.95 });
    let mut vote = VoteEnsemble::new(Vec::new()).add_learner(selector);

    vote.fit(&x, &y).unwrap();
    assert_eq!(vote.transform(&x).unwrap(), array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

    vote.set_option(
        &OptionPath::from("learners.0.learners.0.threshold"),
        &ParameterValue::Float(0.5),
    )
    .unwrap();
    assert!(!vote.is_fitted(), "changing an option discards the fitted model");

    vote.fit(&x, &y).unwrap();
    assert_eq!(vote.transform(&x).unwrap(), y);
}

#[test]
fn test_set_option_rejects_bad_paths() {
    let mut vote = VoteEnsemble::new(Vec::new()).add_learner(
        StackEnsemble::new(StackConfig::default())
            .add_learner(Threshold { threshold: 0.9 })
            .with_stacker(Threshold { threshold: 0.9 }),
    );

    vote.set_option(
        &OptionPath::from("learners.0.stacker.threshold"),
        &ParameterValue::Float(0.5),
    )
    .unwrap();
    vote.set_option(
        &OptionPath::from("learners.0.stacker_training_proportion"),
        &ParameterValue::Float(0.5),
    )
    .unwrap();

    for (path, value) in [
        ("learners.0.learners.3.threshold", ParameterValue::Float(0.1)),
        ("learners.0.no_such_setting", ParameterValue::Bool(true)),
        ("learners.0.keep_original_features", ParameterValue::Float(1.0)),
        ("learners.1.stacker.threshold", ParameterValue::Float(0.1)),
        ("learners.0.stacker", ParameterValue::Float(0.1)),
    ] {
        let err = vote.set_option(&OptionPath::from(path), &value).unwrap_err();
        assert!(
            matches!(err, KolosalError::InvalidParameter { .. }),
            "{} should be rejected, got {}",
            path,
            err
        );
    }
}

#[test]
fn test_grid_tunes_nested_ensemble() {
    let x = array![[0.1], [0.9], [0.2], [0.8], [0.3], [0.7]];
    let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
    let inner = VoteEnsemble::new(vec![Box::new(Threshold { threshold: 0.0 })]);
    let grid = ParameterGrid::new().add("learners.0.threshold", vec![0.05, 0.5, 0.95]);

    let mut selector = BestLearner::new(BestLearnerConfig {
        partition: CVStrategy::StratifiedKFold { n_splits: 3, shuffle: false },
        ..Default::default()
    })
    .add_grid(inner, grid);

    selector.fit(&x, &y).unwrap();
    assert_eq!(selector.best_index(), Some(1));
    assert_eq!(selector.transform(&x).unwrap(), y);
}

#[test]
fn test_nested_failure_keeps_inner_stage() {
    let (x, y) = binary_data();
    let inner = StackEnsemble::new(StackConfig {
        stacker_training_proportion: 0.5,
        ..Default::default()
    })
    .add_learner(Column(0))
    .add_learner(Constant(4.0))
    .with_stacker(Majority::default());
    let mut vote = VoteEnsemble::new(vec![Box::new(inner)]).with_name("outer");

    let err = vote.fit(&x, &y).unwrap_err();
    assert_eq!(
        err.stage(),
        Some(&Stage::LearnerFit { index: 0, name: "stack_ensemble".to_string() })
    );
    match err.root_cause() {
        KolosalError::UnknownLabel(v) => assert_eq!(*v, 4.0),
        other => panic!("unexpected root cause: {}", other),
    }
    let message = err.to_string();
    assert!(message.contains("transform of learner #1 (constant)"), "{}", message);
}
