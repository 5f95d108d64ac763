//! Remote command wrapping

use say_core::{build_command, Endpoint};

#[test]
fn test_local_endpoint_passes_argv_through() {
    let argv = build_command(&Endpoint::local(), &["x", "y"]);
    assert_eq!(argv, vec!["x", "y"]);

    let argv = build_command(&Endpoint::parse(Some("localhost")), &["x", "y"]);
    assert_eq!(argv, vec!["x", "y"]);
}

#[test]
fn test_remote_endpoint_prefixes_ssh() {
    let endpoint = Endpoint::parse(Some("host1"));
    assert!(endpoint.is_remote());
    assert_eq!(endpoint.to_string(), "host1");

    let argv = build_command(&endpoint, &["x", "y"]);
    assert_eq!(argv, vec!["ssh", "host1", "x", "y"]);
}

#[test]
fn test_remote_endpoint_wraps_empty_argv() {
    let argv = build_command::<&str>(&Endpoint::parse(Some("host1")), &[]);
    assert_eq!(argv, vec!["ssh", "host1"]);
}
