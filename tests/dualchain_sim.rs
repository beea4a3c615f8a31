use poe_chain::config::ChainConfig;
use poe_chain::sim::{synthetic_tracks, Simulation};

fn scenario_config() -> ChainConfig {
    ChainConfig {
        rounds: 6,
        committee_size: Some(4),
        active_period: 2,
        malicious: vec!["3".to_string()],
        ..ChainConfig::default()
    }
}

#[test]
fn dual_chain_round_loop_converges() {
    let tracks = synthetic_tracks(6, 6, 9);
    let mut simulation = Simulation::new(scenario_config(), tracks, 9).expect("wire simulation");
    let summary = simulation.run().expect("run simulation");

    assert_eq!(summary.rounds, 6);
    // One routine block per round reaches every ledger copy.
    assert_eq!(summary.normal_height, 6);
    // Priority traffic flows every round, so the committee keeps sealing.
    assert!(summary.priority_height >= 1, "priority chain never grew");
    assert!(summary.chains_agree, "honest nodes disagree on the tip");
}

#[test]
fn malicious_sender_ends_with_the_lowest_reputation() {
    let tracks = synthetic_tracks(6, 6, 11);
    let mut simulation = Simulation::new(scenario_config(), tracks, 11).expect("wire simulation");
    let summary = simulation.run().expect("run simulation");

    let malicious = summary
        .final_reputations
        .iter()
        .find(|(id, _)| id == "3")
        .map(|(_, score)| *score)
        .expect("malicious node scored");
    assert!(malicious < 0.5, "malicious node scored {malicious}");
    for (id, score) in &summary.final_reputations {
        if id != "3" {
            assert!(
                *score > malicious,
                "honest node {id} ({score}) not above the malicious node ({malicious})"
            );
        }
    }
    assert_eq!(
        summary.final_reputations.last().map(|(id, _)| id.as_str()),
        Some("3")
    );
}

#[test]
fn reputations_stay_in_the_unit_interval_across_rounds() {
    let tracks = synthetic_tracks(8, 5, 23);
    let config = ChainConfig {
        rounds: 5,
        committee_size: Some(4),
        ..ChainConfig::default()
    };
    let mut simulation = Simulation::new(config, tracks, 23).expect("wire simulation");
    let summary = simulation.run().expect("run simulation");
    for (id, score) in &summary.final_reputations {
        assert!(
            (0.0..=1.0).contains(score),
            "node {id} scored {score} outside [0, 1]"
        );
    }
}
