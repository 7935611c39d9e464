mod common;

use appraisal_server::{
    generate_content_url, resolve_target, AppraiserError, ModelTarget, ServerConfig, VertexConfig,
};
use common::env_map;

fn config_from(pairs: &[(&str, &str)]) -> VertexConfig {
    let env = env_map(pairs);
    VertexConfig::from_lookup(&|key| env.get(key).cloned())
}

#[test]
fn test_endpoint_id_wins() {
    let config = config_from(&[
        ("PROJECT_ID", "auction-house"),
        ("VERTEX_LOCATION", "us-central1"),
        ("VERTEX_ENDPOINT_ID", "1234567890"),
        ("VERTEX_MODEL", "projects/other/locations/europe-west4/models/999"),
        ("GEMINI_MODEL", "gemini-2.0-flash"),
    ]);

    let target = resolve_target(&config).expect("endpoint config is complete");
    assert_eq!(
        target,
        ModelTarget::Endpoint {
            project_id: "auction-house".to_string(),
            location: "us-central1".to_string(),
            endpoint_id: "1234567890".to_string(),
        }
    );
    assert_eq!(
        target.generate_content_url(),
        "https://us-central1-aiplatform.googleapis.com/v1/projects/auction-house/locations/us-central1/endpoints/1234567890:generateContent"
    );
}

#[test]
fn test_model_resource_path() {
    let config = config_from(&[
        ("VERTEX_ENDPOINT_ID", "1234567890"),
        ("VERTEX_MODEL", "  projects/tuned-proj/locations/europe-west4/models/555@2  "),
        ("PROJECT_ID", "auction-house"),
    ]);

    let target = resolve_target(&config).expect("model resource path is enough");
    assert_eq!(
        target.generate_content_url(),
        "https://europe-west4-aiplatform.googleapis.com/v1/projects/tuned-proj/locations/europe-west4/models/555@2:generateContent",
        "project and location come from the resource path"
    );
}

#[test]
fn test_malformed_model_falls_back_to_publisher_model() {
    let config = config_from(&[
        ("VERTEX_MODEL", "gemini-2.0-flash"),
        ("GEMINI_MODEL", "gemini-2.0-flash"),
        ("PROJECT_ID", "auction-house"),
        ("VERTEX_LOCATION", "us-east4"),
    ]);

    let target = resolve_target(&config).unwrap();
    assert!(matches!(target, ModelTarget::Publisher { .. }));
    assert_eq!(
        target.generate_content_url(),
        "https://us-east4-aiplatform.googleapis.com/v1/projects/auction-house/locations/us-east4/publishers/google/models/gemini-2.0-flash:generateContent"
    );
}

#[test]
fn test_incomplete_config_is_missing() {
    let cases: Vec<Vec<(&str, &str)>> = vec![
        vec![],
        vec![("GEMINI_MODEL", "gemini-2.0-flash"), ("PROJECT_ID", "p")],
        vec![("VERTEX_ENDPOINT_ID", "1"), ("VERTEX_LOCATION", "us-central1")],
        vec![("VERTEX_MODEL", "models/555")],
        vec![("GEMINI_MODEL", "   "), ("PROJECT_ID", "p"), ("VERTEX_LOCATION", "l")],
    ];

    for pairs in cases {
        let config = config_from(&pairs);
        assert_eq!(resolve_target(&config), None, "config {:?} should not resolve", pairs);
        assert!(matches!(
            generate_content_url(&config),
            Err(AppraiserError::MissingModelConfig)
        ));
    }
}

#[test]
fn test_missing_config_message() {
    let err = generate_content_url(&VertexConfig::default()).unwrap_err();

    assert!(err.to_string().starts_with("Missing model config"));
    assert_eq!(err.http_status(), 500);
}

#[test]
fn test_server_config_from_lookup() {
    let env = env_map(&[("APPRAISER_BIND", "0.0.0.0:8080")]);
    let config = ServerConfig::from_lookup(&|key| env.get(key).cloned()).unwrap();
    assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
    assert_eq!(config.timeout_seconds, 120);

    let env = env_map(&[("APPRAISER_BIND", "not-an-address")]);
    assert!(ServerConfig::from_lookup(&|key| env.get(key).cloned()).is_err());
}
