//! # bayeskernel REPL
//!
//! A Read-Eval-Print Loop over the kernel's public operations, backed by an
//! in-process [`InMemoryStore`]. State does not survive a restart; this is
//! a demo/debugging tool, not a server (see `bayeskernel-server` for the
//! worker protocol).
//!
//! ```bash
//! cargo run --bin bayeskernel-repl
//! ```
//!
//! Commands:
//! - `.login <username>` - demo login, registers on first use
//! - `.create-model <title>` - create a model you own
//! - `.create-variable <model_id> <title>` - create a root variable (prior 0.5)
//! - `.set-prior <node_id> <p>` - set a root variable's prior
//! - `.add-parent <parent_id> <child_id>` - add a wildcard parent edge
//! - `.remove-parent <parent_id> <child_id>` - drop a parent edge
//! - `.remove-variable <node_id>` - delete a variable
//! - `.list <model_id>` - list a model's variables
//! - `.marginals <model_id>` - compute P(X=TRUE) for every variable
//! - `.intervene <model_id> <node_id>` - do(node=T) vs do(node=F) marginals
//! - `.sensitivity <model_id> <target_id>` - per-ancestor causal effect
//! - `.help` - show this help
//! - `.quit` - exit

use bayeskernel::auth::Principal;
use bayeskernel::config::Config;
use bayeskernel::graph::{self, VariablePatch};
use bayeskernel::ids::{ModelId, NodeId};
use bayeskernel::inference_service::{self, InferenceService};
use bayeskernel::store::{InMemoryStore, Store};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::io::{self, Write};

const CREDENTIALS_PATH: &str = "bayeskernel-repl-credentials.json";

/// A registered demo username and its salted password digest, persisted
/// across REPL restarts. This is a throwaway login for a local CLI demo,
/// not a credential store the kernel library exposes or relies on.
#[derive(Debug, Serialize, Deserialize)]
struct DemoCredential {
    username: String,
    salt_hex: String,
    digest_hex: String,
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

fn digest(password: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

fn main() {
    let config = Config::load().unwrap_or_default();
    config.logging.init();

    println!("bayeskernel REPL");
    println!("================\n");
    println!("Type .help for a list of commands, .quit to exit.\n");

    let store = InMemoryStore::new();
    let service = InferenceService::new(config.inference);

    let principal = match login() {
        Some(p) => p,
        None => return,
    };

    let mut request_counter: u64 = 0;
    loop {
        print!("bayeskernel> ");
        io::stdout().flush().ok();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        match parts.as_slice() {
            [".quit"] | [".exit"] => {
                println!("Goodbye!");
                break;
            }
            [".help"] => print_help(),
            [".create-model", title @ ..] => {
                let title = title.join(" ");
                match graph::create_model(store.as_ref(), &principal, &title) {
                    Ok(id) => println!("model {id}"),
                    Err(e) => println!("error: {e}"),
                }
            }
            [".create-variable", model_id, title @ ..] => {
                let title = title.join(" ");
                let model_id = ModelId::from(*model_id);
                match graph::create_variable(store.as_ref(), &principal, &model_id, &title, None, 0.0, 0.0) {
                    Ok(id) => println!("variable {id}"),
                    Err(e) => println!("error: {e}"),
                }
            }
            [".set-prior", node_id, p] => {
                let Ok(p) = p.parse::<f64>() else {
                    println!("error: probability must be a number");
                    continue;
                };
                let node_id = NodeId::from(*node_id);
                let patch = VariablePatch {
                    cpt: Some(vec![bayeskernel::cpt::CptEntry {
                        parent_states: Default::default(),
                        probability: p,
                    }]),
                    ..Default::default()
                };
                match graph::update_variable(store.as_ref(), &principal, &node_id, patch) {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {e}"),
                }
            }
            [".add-parent", parent_id, child_id] => {
                let parent_id = NodeId::from(*parent_id);
                let child_id = NodeId::from(*child_id);
                match graph::add_parent(store.as_ref(), &principal, &parent_id, &child_id) {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {e}"),
                }
            }
            [".remove-parent", parent_id, child_id] => {
                let parent_id = NodeId::from(*parent_id);
                let child_id = NodeId::from(*child_id);
                match graph::remove_parent(store.as_ref(), &principal, &parent_id, &child_id) {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {e}"),
                }
            }
            [".remove-variable", node_id] => {
                let node_id = NodeId::from(*node_id);
                match graph::remove_variable(store.as_ref(), &principal, &node_id) {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {e}"),
                }
            }
            [".list", model_id] => {
                let model_id = ModelId::from(*model_id);
                match graph::load_model_variables(store.as_ref(), &principal, &model_id) {
                    Ok(records) => {
                        for record in records {
                            println!("{} {} (p0={:.3})", record.id, record.title, record.cpt.first().map_or(0.0, |e| e.probability));
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            [".marginals", model_id] => {
                let model_id = ModelId::from(*model_id);
                match load_snapshot(store.as_ref(), &principal, &model_id) {
                    Ok(nodes) => {
                        request_counter += 1;
                        let request_id = format!("repl-{request_counter}");
                        match service.compute_marginals(&nodes, &request_id) {
                            Ok(Some(marginals)) => print_marginals(&marginals),
                            Ok(None) => println!("superseded by a later request"),
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            [".intervene", model_id, node_id] => {
                let model_id = ModelId::from(*model_id);
                let node_id = NodeId::from(*node_id);
                match load_snapshot(store.as_ref(), &principal, &model_id) {
                    Ok(nodes) => {
                        request_counter += 1;
                        let request_id = format!("repl-{request_counter}");
                        match service.compute_marginals_with_intervention(&nodes, &node_id, &request_id) {
                            Ok(Some((true_case, false_case))) => {
                                println!("do({node_id}=TRUE):");
                                print_marginals(&true_case);
                                println!("do({node_id}=FALSE):");
                                print_marginals(&false_case);
                            }
                            Ok(None) => println!("superseded by a later request"),
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            [".sensitivity", model_id, target_id] => {
                let model_id = ModelId::from(*model_id);
                let target_id = NodeId::from(*target_id);
                match load_snapshot(store.as_ref(), &principal, &model_id) {
                    Ok(nodes) => {
                        request_counter += 1;
                        let request_id = format!("repl-{request_counter}");
                        let result = service.compute_sensitivity(&nodes, &target_id, &request_id, |r| {
                            println!("  {} -> {:+.4}", r.node, r.sensitivity);
                        });
                        match result {
                            Ok(Some(_)) => {}
                            Ok(None) => println!("superseded by a later request"),
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            _ => {
                println!("Unknown command: {input}");
                println!("Type .help for available commands");
            }
        }
    }
}

fn load_snapshot(
    store: &dyn Store,
    principal: &Principal,
    model_id: &ModelId,
) -> bayeskernel::KernelResult<Vec<inference_service::InferenceNode>> {
    let records = graph::load_model_variables(store, principal, model_id)?;
    Ok(inference_service::snapshot(&records))
}

fn print_marginals(marginals: &bayeskernel::sampling::Marginals) {
    let mut entries: Vec<(&NodeId, f64)> = marginals.0.iter().map(|(k, v)| (k, *v)).collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (id, p) in entries {
        println!("  {id} -> {p:.4}");
    }
}

fn print_help() {
    println!("\nCommands:");
    println!("  .create-model <title>");
    println!("  .create-variable <model_id> <title>");
    println!("  .set-prior <node_id> <p>");
    println!("  .add-parent <parent_id> <child_id>");
    println!("  .remove-parent <parent_id> <child_id>");
    println!("  .remove-variable <node_id>");
    println!("  .list <model_id>");
    println!("  .marginals <model_id>");
    println!("  .intervene <model_id> <node_id>");
    println!("  .sensitivity <model_id> <target_id>");
    println!("  .help");
    println!("  .quit\n");
}

fn login() -> Option<Principal> {
    let mut username = String::new();
    print!("username: ");
    io::stdout().flush().ok();
    io::stdin().read_line(&mut username).ok()?;
    let username = username.trim().to_string();
    if username.is_empty() {
        return None;
    }

    let password = rpassword_or_plain("password: ");

    let mut credentials = load_credentials();
    match credentials.iter().find(|c| c.username == username) {
        Some(existing) => {
            let Some(salt) = from_hex(&existing.salt_hex) else {
                println!("corrupt credentials file");
                return None;
            };
            if digest(&password, &salt) != existing.digest_hex {
                println!("wrong password");
                return None;
            }
        }
        None => {
            let mut salt = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut salt);
            credentials.push(DemoCredential {
                username: username.clone(),
                salt_hex: to_hex(&salt),
                digest_hex: digest(&password, &salt),
            });
            save_credentials(&credentials);
            println!("registered new demo user {username}");
        }
    }

    Some(Principal { username })
}

/// Plain stdin read; the teacher's CLI has no secure-input dependency, and
/// this is a local demo tool, not a production login surface.
fn rpassword_or_plain(prompt: &str) -> String {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut password = String::new();
    io::stdin().read_line(&mut password).ok();
    password.trim().to_string()
}

fn load_credentials() -> Vec<DemoCredential> {
    std::fs::read_to_string(CREDENTIALS_PATH)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn save_credentials(credentials: &[DemoCredential]) {
    if let Ok(json) = serde_json::to_string_pretty(credentials) {
        let _ = std::fs::write(CREDENTIALS_PATH, json);
    }
}
