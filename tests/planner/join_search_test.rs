// tests/planner/join_search_test.rs
mod common;

use common::{assert_complete, oracle, seeded};
use ljqo::config::Algorithm;
use ljqo::planner::{JoinSearch, PlanError, Strategy};

#[test]
fn test_small_queries_go_exhaustive() {
    let query = common::chain(5);
    let search = JoinSearch::new(oracle(&query), &seeded(1));
    assert_eq!(search.strategy(), Strategy::Exhaustive);

    let outcome = search.run().unwrap();
    assert_eq!(outcome.strategy, Strategy::Exhaustive);
    assert_complete(&outcome.plan, 5);
    assert_eq!(outcome.stats.states_built, 0);
    assert_eq!(outcome.stats.samples, 0);
}

#[test]
fn test_threshold_is_exclusive() {
    let mut settings = seeded(1);
    settings.selector.threshold = 6;

    let below = common::chain(5);
    assert_eq!(
        JoinSearch::new(oracle(&below), &settings).strategy(),
        Strategy::Exhaustive
    );

    let at = common::chain(6);
    assert_eq!(
        JoinSearch::new(oracle(&at), &settings).strategy(),
        Strategy::TwoPhase
    );
}

#[test]
fn test_large_queries_use_configured_algorithm() {
    let query = common::star(14);

    let outcome = JoinSearch::new(oracle(&query), &seeded(2)).run().unwrap();
    assert_eq!(outcome.strategy, Strategy::TwoPhase);
    assert_complete(&outcome.plan, 14);
    assert!(outcome.stats.states_built > 0);

    let mut settings = seeded(2);
    settings.selector.algorithm = Algorithm::Sdp;
    let outcome = JoinSearch::new(oracle(&query), &settings).run().unwrap();
    assert_eq!(outcome.strategy, Strategy::SampleDp);
    assert_complete(&outcome.plan, 14);
    assert!(outcome.stats.samples >= 14);
}

#[test]
fn test_forced_strategy_ignores_threshold() {
    let query = common::chain(4);
    for strategy in [Strategy::Exhaustive, Strategy::TwoPhase, Strategy::SampleDp] {
        let outcome = JoinSearch::new(oracle(&query), &seeded(3))
            .with_strategy(strategy)
            .run()
            .unwrap();
        assert_eq!(outcome.strategy, strategy);
        assert_complete(&outcome.plan, 4);
    }
}

#[test]
fn test_randomized_search_close_to_exhaustive() {
    let query = common::star(9);
    let exact = JoinSearch::new(oracle(&query), &seeded(4))
        .with_strategy(Strategy::Exhaustive)
        .optimize()
        .unwrap();
    let twopo = JoinSearch::new(oracle(&query), &seeded(4))
        .with_strategy(Strategy::TwoPhase)
        .optimize()
        .unwrap();

    assert!(exact.cost <= twopo.cost * (1.0 + 1e-9));
}

#[test]
fn test_empty_query() {
    let query = ljqo::QueryGraph::new();
    let err = JoinSearch::new(oracle(&query), &seeded(1)).optimize().unwrap_err();
    assert_eq!(err, PlanError::EmptyQuery);
}

#[test]
fn test_strategy_names() {
    assert_eq!("dp".parse::<Strategy>().unwrap(), Strategy::Exhaustive);
    assert_eq!("TwoPO".parse::<Strategy>().unwrap(), Strategy::TwoPhase);
    assert_eq!(Strategy::SampleDp.to_string(), "sdp");
    assert!("geqo".parse::<Strategy>().is_err());
    assert_eq!(Strategy::from(Algorithm::Sdp), Strategy::SampleDp);
}

#[test]
fn test_invalid_settings_are_rejected_before_search() {
    let query = common::chain(14);

    let mut settings = seeded(1);
    settings.twopo.sa_temperature_reduction = 1.0;
    let err = JoinSearch::new(oracle(&query), &settings).run().unwrap_err();
    assert!(matches!(err, PlanError::InvalidSettings(ref msg) if msg.contains("sa_temperature_reduction")));

    // 25 relations sit below this threshold but above the exhaustive limit.
    let mut settings = seeded(1);
    settings.selector.threshold = 30;
    let err = JoinSearch::new(oracle(&common::chain(25)), &settings).optimize().unwrap_err();
    assert!(matches!(err, PlanError::InvalidSettings(ref msg) if msg.contains("selector.threshold")));
}
