use pkd_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

/// Validates:
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) Keys under consumed prefixes are not flagged.

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
claim:
  max_attempts: 4
legacy:
  autostart_cache: true
  poll_ms: 250
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let report =
        report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).expect("warn must not error");

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/legacy/autostart_cache".to_string(),
            "/legacy/poll_ms".to_string()
        ]
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
claim:
  max_attempts: 4
legacy:
  poll_ms: 250
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn list_entries_under_consumed_prefix_are_not_flagged() {
    let yaml = r#"
claim:
  open_status_tags: ["processing", "on-hold"]
refresh:
  interval_secs: 30
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "unexpected: {:?}", report.unused_leaf_pointers);
}
