//! Help routing and summary listings.

mod common;

use common::{req, rule, script, Frame, MockClient};
use remex_protocol::ErrorCode;
use remex_server::{run_command, Config, StaticAcl};
use tempfile::TempDir;

#[tokio::test]
async fn help_runs_the_rule_help_subcommand_with_the_topic() {
    let dir = TempDir::new().unwrap();
    let prog = script(dir.path(), "show-args", "echo \"$@\"");
    let mut helped = rule("svc", "ALL", &prog);
    helped.help = Some("assist".to_string());
    let config = Config { rules: vec![helped] };

    let mut client = MockClient::v2();
    run_command(&mut client, &config, &StaticAcl, &req(&["help", "svc", "topic"])).await;

    // argv[1] is the rule's help subcommand, argv[2] the client's topic.
    assert_eq!(client.stdout_bytes(), b"assist topic\n");
    assert_eq!(client.final_status(), 0);
}

#[tokio::test]
async fn help_without_topic_subcommand_still_dispatches() {
    let dir = TempDir::new().unwrap();
    let prog = script(dir.path(), "show-args", "echo \"$@\"");
    let mut helped = rule("svc", "EMPTY", &prog);
    helped.help = Some("assist".to_string());
    let config = Config { rules: vec![helped] };

    let mut client = MockClient::v2();
    run_command(&mut client, &config, &StaticAcl, &req(&["help", "svc"])).await;

    assert_eq!(client.stdout_bytes(), b"assist\n");
    assert_eq!(client.final_status(), 0);
}

#[tokio::test]
async fn help_for_rule_without_help_entry_is_refused() {
    let dir = TempDir::new().unwrap();
    let prog = script(dir.path(), "noop", "true");
    let config = Config {
        rules: vec![rule("svc", "ALL", &prog)],
    };

    let mut client = MockClient::v2();
    run_command(&mut client, &config, &StaticAcl, &req(&["help", "svc", "topic"])).await;

    assert_eq!(client.error_codes(), vec![ErrorCode::NoHelp]);
}

#[tokio::test]
async fn help_with_extra_arguments_warns_but_continues() {
    let dir = TempDir::new().unwrap();
    let prog = script(dir.path(), "show-args", "echo \"$@\"");
    let mut helped = rule("svc", "ALL", &prog);
    helped.help = Some("assist".to_string());
    let config = Config { rules: vec![helped] };

    let mut client = MockClient::v2();
    run_command(
        &mut client,
        &config,
        &StaticAcl,
        &req(&["help", "svc", "topic", "extra"]),
    )
    .await;

    // The warning frame comes first, then the first three tokens are
    // processed as usual.
    assert_eq!(client.error_codes(), vec![ErrorCode::TooManyArgs]);
    assert_eq!(client.stdout_bytes(), b"assist topic\n");
    assert_eq!(client.final_status(), 0);
}

#[tokio::test]
async fn summary_runs_each_eligible_rule_once() {
    let dir = TempDir::new().unwrap();
    let alpha = script(dir.path(), "alpha", "echo alpha: files");
    let beta = script(dir.path(), "beta", "echo beta: backups; exit 3");
    let hidden_marker = dir.path().join("hidden-ran");
    let hidden = script(
        dir.path(),
        "hidden",
        &format!("touch {}", hidden_marker.display()),
    );

    let mut rule_alpha = rule("alpha", "ALL", &alpha);
    rule_alpha.summary = Some("summary".to_string());
    let mut rule_beta = rule("beta", "ALL", &beta);
    rule_beta.summary = Some("summary".to_string());
    // Denied to the test user: must not be invoked at all.
    let mut rule_hidden = rule("hidden", "ALL", &hidden);
    rule_hidden.summary = Some("summary".to_string());
    rule_hidden.acl = vec!["somebody-else@EXAMPLE.ORG".to_string()];
    // No summary subcommand: skipped.
    let rule_plain = rule("plain", "ALL", &alpha);

    let config = Config {
        rules: vec![rule_alpha, rule_beta, rule_hidden, rule_plain],
    };

    let mut client = MockClient::v2();
    run_command(&mut client, &config, &StaticAcl, &req(&["help"])).await;

    let output = String::from_utf8(client.stdout_bytes()).unwrap();
    assert!(output.contains("alpha: files"));
    assert!(output.contains("beta: backups"));
    // Aggregate status is the last non-zero invocation's.
    assert_eq!(client.final_status(), 3);
    assert!(!hidden_marker.exists(), "denied rule must not run");
}

#[tokio::test]
async fn summary_aggregates_output_for_protocol_one() {
    let dir = TempDir::new().unwrap();
    let alpha = script(dir.path(), "alpha", "echo alpha: files");
    let beta = script(dir.path(), "beta", "echo beta: backups");

    let mut rule_alpha = rule("alpha", "ALL", &alpha);
    rule_alpha.summary = Some("summary".to_string());
    let mut rule_beta = rule("beta", "ALL", &beta);
    rule_beta.summary = Some("summary".to_string());
    let config = Config {
        rules: vec![rule_alpha, rule_beta],
    };

    let mut client = MockClient::v1();
    run_command(&mut client, &config, &StaticAcl, &req(&["help"])).await;

    let (output, status) = client.v1_result();
    assert_eq!(output, b"alpha: files\nbeta: backups\n");
    assert_eq!(status, 0);
    // One combined message, nothing streamed.
    assert_eq!(client.frames.len(), 1);
}

#[tokio::test]
async fn summary_with_no_eligible_rules_is_unknown() {
    let dir = TempDir::new().unwrap();
    let prog = script(dir.path(), "noop", "true");
    // Has a summary but a literal subcommand, so it is not eligible.
    let mut literal = rule("svc", "start", &prog);
    literal.summary = Some("summary".to_string());
    let config = Config { rules: vec![literal] };

    let mut client = MockClient::v2();
    run_command(&mut client, &config, &StaticAcl, &req(&["help"])).await;

    assert_eq!(client.error_codes(), vec![ErrorCode::UnknownCommand]);
    assert!(!client
        .frames
        .iter()
        .any(|f| matches!(f, Frame::Status(_) | Frame::Output(..))));
}

#[tokio::test]
async fn summary_invocation_exports_its_subcommand() {
    let dir = TempDir::new().unwrap();
    let prog = script(dir.path(), "show", "printf '%s\\n' \"$REMCTL_COMMAND\" \"$1\"");
    let mut summarized = rule("svc", "ALL", &prog);
    summarized.summary = Some("describe".to_string());
    let config = Config {
        rules: vec![summarized],
    };

    let mut client = MockClient::v2();
    run_command(&mut client, &config, &StaticAcl, &req(&["help"])).await;

    assert_eq!(client.stdout_bytes(), b"describe\ndescribe\n");
    assert_eq!(client.final_status(), 0);
}
