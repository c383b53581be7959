//! Request dispatch: the top-level entry for one client command.
//!
//! The dispatcher validates the request, resolves it against the rule
//! table, routes help and summary requests, checks authorization, and
//! runs the matched rule's program through the launcher and the pump.
//! Nothing is ever sent to the client before a rule has matched and the
//! ACL gate has permitted it, except the error frame that says why not.

use tracing::{debug, info, warn};

use remex_protocol::{ClientStream, ErrorCode};

use crate::acl::AclGate;
use crate::audit;
use crate::command::{self, CommandLine};
use crate::config::{Config, Rule, MATCH_ALL};
use crate::process::{pump, spawn_child, SigChld, SpawnParams};

/// Outcome of one child execution, after reap.
struct Finished {
    status: i32,
    output: Vec<u8>,
}

/// Process one incoming command from an authenticated client.
///
/// `argv` chunks are opaque bytes: chunk 0 is the command, chunk 1 the
/// subcommand, chunks from 1 on the argv positions. Everything the caller
/// needs to know is delivered through the client stream — output frames,
/// a final status frame, or an error frame.
pub async fn run_command<C: ClientStream, A: AclGate>(
    client: &mut C,
    config: &Config,
    acl: &A,
    argv: &[Vec<u8>],
) {
    let user = client.user().to_owned();

    if argv.is_empty() {
        info!("empty command from user {user}");
        let _ = client
            .send_error(ErrorCode::BadCommand, "Invalid command token")
            .await;
        return;
    }

    // Neither the command nor the subcommand may ever contain nuls.
    if let Err(i) = command::validate_command_tokens(argv) {
        info!(
            "{} from user {user} contains nul octet",
            if i == 0 { "command" } else { "subcommand" }
        );
        let _ = client
            .send_error(ErrorCode::BadCommand, "Invalid command token")
            .await;
        return;
    }

    let cmd = String::from_utf8_lossy(&argv[0]).into_owned();
    let subcommand = argv.get(1).map(|c| String::from_utf8_lossy(c).into_owned());

    // If nothing matches and the command is a help command, dispatch to
    // the summary listing (no topic) or re-resolve against the topic.
    let mut rule = config.resolve(Some(&cmd), subcommand.as_deref());
    let mut help = false;
    let mut help_topic: Option<String> = None;

    if rule.is_none() && cmd == "help" {
        if argv.len() > 3 {
            info!("help command from user {user} has more than three arguments");
            let _ = client
                .send_error(ErrorCode::TooManyArgs, "Too many arguments for help command")
                .await;
        }
        match subcommand.as_deref() {
            None => {
                send_summary(client, config, acl).await;
                return;
            }
            Some(topic) => {
                help = true;
                help_topic = argv.get(2).map(|c| String::from_utf8_lossy(c).into_owned());
                rule = config.resolve(Some(topic), help_topic.as_deref());
            }
        }
    }

    // Arguments may only contain nuls if they're the one being passed on
    // standard input.
    if let Err(i) = command::validate_arguments(argv, rule, help) {
        info!("argument {i} from user {user} contains nul octet");
        let _ = client
            .send_error(ErrorCode::BadCommand, "Invalid command token")
            .await;
        return;
    }

    // Log after resolution so the rule's logmask can be applied.
    audit::log_command(argv, rule, &user);

    let Some(rule) = rule else {
        match subcommand.as_deref() {
            Some(sub) => info!("unknown command {cmd} {sub} from user {user}"),
            None => info!("unknown command {cmd} from user {user}"),
        }
        let _ = client
            .send_error(ErrorCode::UnknownCommand, "Unknown command")
            .await;
        return;
    };

    if !acl.permit(rule, &user) {
        match subcommand.as_deref() {
            Some(sub) => info!("access denied: user {user}, command {cmd} {sub}"),
            None => info!("access denied: user {user}, command {cmd}"),
        }
        let _ = client.send_error(ErrorCode::Access, "Access denied").await;
        return;
    }

    let cmdline = if help {
        let Some(help_sub) = rule.help.as_deref() else {
            info!("command {cmd} from user {user} has no defined help");
            let _ = client
                .send_error(ErrorCode::NoHelp, "No help defined for command")
                .await;
            return;
        };
        command::build_help_argv(rule, help_sub, help_topic.as_deref())
    } else {
        command::build_command_argv(rule, argv)
    };

    if let Some(done) = execute(client, rule, cmdline, &cmd).await {
        send_final(client, done).await;
    }
}

/// Answer a bare `help` request: run every summary-capable rule the user
/// may access and aggregate the results. The final status is that of the
/// last failing invocation, or zero.
async fn send_summary<C: ClientStream, A: AclGate>(client: &mut C, config: &Config, acl: &A) {
    let user = client.user().to_owned();
    let streamed = client.protocol().streams_output();
    let mut any = false;
    let mut aggregate = Vec::new();
    let mut status_all = 0;

    for rule in &config.rules {
        if rule.subcommand != MATCH_ALL {
            continue;
        }
        if !acl.permit(rule, &user) {
            continue;
        }
        let Some(summary) = rule.summary.as_deref() else {
            continue;
        };
        any = true;

        let cmdline = command::build_summary_argv(rule, summary);
        if let Some(done) = execute(client, rule, cmdline, summary).await {
            if !streamed {
                aggregate.extend_from_slice(&done.output);
            }
            if done.status != 0 {
                status_all = done.status;
            }
        }
    }

    if any {
        send_final(
            client,
            Finished {
                status: status_all,
                output: aggregate,
            },
        )
        .await;
    } else {
        info!("summary request from user {user}, but no defined summaries");
        let _ = client
            .send_error(ErrorCode::UnknownCommand, "Unknown command")
            .await;
    }
}

/// Launch a rule's program, pump its I/O, and reap it. Internal failures
/// have already been reported to the client when this returns None.
async fn execute<C: ClientStream>(
    client: &mut C,
    rule: &Rule,
    cmdline: CommandLine,
    command: &str,
) -> Option<Finished> {
    // The SIGCHLD funnel must exist before the fork, or a fast-exiting
    // child could be missed.
    let mut sigchld = match SigChld::new() {
        Ok(sigchld) => sigchld,
        Err(e) => {
            warn!("{e}");
            let _ = client
                .send_error(ErrorCode::Internal, "Internal failure")
                .await;
            return None;
        }
    };

    let user = client.user().to_owned();
    let ip_address = client.ip_address().to_owned();
    let hostname = client.hostname().map(str::to_owned);
    let separate_stderr = client.protocol().streams_output();

    let mut process = match spawn_child(SpawnParams {
        rule,
        cmdline,
        command,
        user: &user,
        ip_address: &ip_address,
        hostname: hostname.as_deref(),
        separate_stderr,
    }) {
        Ok(process) => process,
        Err(e) => {
            warn!("{e}");
            let _ = client
                .send_error(ErrorCode::Internal, "Internal failure")
                .await;
            return None;
        }
    };

    let ok = pump(client, &mut process, &mut sigchld).await;

    // The pump dropped the parent-side channels; a child still running
    // after a broken loop sees EOF and can exit, so a blocking reap here
    // cannot leave a zombie behind.
    if !process.reaped {
        process.reap_blocking();
    }

    if ok {
        Some(Finished {
            status: process.status,
            output: process.output,
        })
    } else {
        None
    }
}

/// Emit the terminating frame: combined output and status for protocol
/// version one, a status frame for version two and later.
async fn send_final<C: ClientStream>(client: &mut C, done: Finished) {
    let res = if client.protocol().streams_output() {
        client.send_status(done.status).await
    } else {
        client.send_output_v1(&done.output, done.status).await
    };
    if let Err(e) = res {
        debug!("cannot send final status to client: {e}");
    }
}
