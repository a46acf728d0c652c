#![allow(clippy::unwrap_used, clippy::expect_used)]

use fleet_core::*;

// ---------------------------------------------------------------------------
// 1. A full TOML document drives every knob of the pipeline
// ---------------------------------------------------------------------------

#[test]
fn full_config_document_loads_and_validates() {
    let raw = r#"
        profile = "full"
        refinement_threshold = 7.0
        max_refinement_rounds = 3
        enable_judge = true
        judge_timeout_seconds = 1.5
        cache_ttl_seconds = 0
        cache_max_entries = 16
        max_parallel_agents = 3
        simple_task_max_words = 25
        complex_task_min_words = 100
        reasoning_timeout_seconds = 20
        agent_timeout_seconds = 90

        [reasoning_retry]
        max_attempts = 4
        backoff_base_ms = 250
        backoff_max_ms = 2000

        [agent_retry]
        max_attempts = 1

        [model]
        provider = "openrouter"
        model_id = "openai/gpt-4.1-mini"
        api_key = "sk-test"
    "#;

    let config = FleetConfig::from_toml_str(raw).unwrap();
    config.validate().unwrap();

    assert!(config.judge_enabled());
    assert_eq!(config.refinement_rounds(), 3);
    assert_eq!(config.judge_timeout().as_millis(), 1500);
    assert!(config.cache_ttl().is_zero());
    assert_eq!(config.agent_retry.max_attempts, 1);
    assert_eq!(
        config.model.as_ref().unwrap().base_url(),
        "https://openrouter.ai/api"
    );
    assert!(config.fingerprint().contains("openai/gpt-4.1-mini"));
}

// ---------------------------------------------------------------------------
// 2. Missing model id is a configuration error
// ---------------------------------------------------------------------------

#[test]
fn empty_model_id_is_rejected() {
    let config = FleetConfig::from_toml_str("[model]\nmodel_id = \"  \"\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("model_id"));
}

// ---------------------------------------------------------------------------
// 3. Data model serializes with the wire names the streaming layer expects
// ---------------------------------------------------------------------------

#[test]
fn routing_plan_wire_format() {
    let plan = RoutingPlan {
        assigned_agents: vec!["researcher".into(), "writer".into()],
        execution_mode: ExecutionMode::Sequential,
        tool_requirements: vec!["web_search".into()],
        subtasks: vec![Subtask::new("researcher", "find sources")],
        reasoning: "needs facts, then prose".into(),
    };
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["execution_mode"], "sequential");
    assert_eq!(json["subtasks"][0]["agent"], "researcher");

    let back: RoutingPlan = serde_json::from_value(json).unwrap();
    assert_eq!(back, plan);
}

#[test]
fn quality_assessment_wire_format() {
    let quality = QualityAssessment {
        score: 6.5,
        flag: QualityFlag::NeedsRefinement,
        improvements: "cite sources".into(),
        reasoning: String::new(),
    };
    let json = serde_json::to_value(&quality).unwrap();
    assert_eq!(json["flag"], "needs_refinement");
    assert!(quality.is_below(8.0));
    assert!(!quality.is_below(6.5));
}

// ---------------------------------------------------------------------------
// 4. Roster lookups resolve capability tags produced by analysis
// ---------------------------------------------------------------------------

#[test]
fn roster_resolves_analysis_capabilities() {
    let roster = default_roster();
    let analysis = AnalysisResult {
        complexity: Complexity::Medium,
        capabilities: vec!["web_search".into(), "writing".into()],
        steps: 2,
        needs_web_search: true,
        reasoning: String::new(),
    };

    let mut ids: Vec<&str> = analysis
        .capabilities
        .iter()
        .flat_map(|c| roster.agents_for_capability(c))
        .map(AgentProfile::id)
        .collect();
    ids.dedup();
    assert_eq!(ids, vec!["researcher", "writer"]);
}
