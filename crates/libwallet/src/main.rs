mod cli;

use std::sync::Arc;

use clap::Parser;
use eyre::{bail, WrapErr};

use libwallet_core::decode::{decode_transaction_hex, NoContext};
use libwallet_core::logging::LogConfig;
use libwallet_core::rpc::{HttpRpcClient, RpcClient, RpcOptions};
use libwallet_core::types::AccountRef;
use libwallet_core::wallet::Keyring;
use libwallet_core::{Session, SessionConfig};

use cli::{Cli, Command, RunArgs};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Cli::parse();

    let mut config =
        SessionConfig::new(&args.root_dir, &args.network).wrap_err("invalid --network")?;
    config.log = LogConfig {
        level: args.log_level.clone(),
        rotation: args.log_rotation,
        max_log_files: args.max_log_files,
        mirror_stderr: matches!(args.command, Command::Run(_)),
    };

    match args.command {
        Command::Run(run) => run_session(config, run).await,
        Command::SignMessage {
            wif,
            passphrase,
            address,
            message,
        } => {
            config.listen_for_signals = false;
            let session = Session::open(config).wrap_err("opening wallet session")?;

            let mut keyring = Keyring::new(session.network(), passphrase.as_bytes());
            let p2pkh = keyring
                .import_wif(
                    &wif,
                    AccountRef {
                        number: 0,
                        name: "default".to_owned(),
                    },
                )
                .wrap_err("importing --wif")?;
            session
                .loader()
                .load_wallet(Arc::new(keyring))
                .wrap_err("loading keyring")?;

            let address = address.unwrap_or_else(|| p2pkh.to_string());
            let signature = session
                .sign_message(passphrase.as_bytes(), &address, &message)
                .wrap_err_with(|| format!("signing with {address}"))?;
            session.shutdown(false);
            println!("{signature}");
            Ok(())
        }
        Command::VerifyMessage {
            address,
            message,
            signature,
        } => {
            config.listen_for_signals = false;
            let session = Session::open(config).wrap_err("opening wallet session")?;
            let valid = session
                .verify_message(&address, &message, &signature)
                .wrap_err("verifying message")?;
            session.shutdown(false);
            println!("{valid}");
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::DecodeTx { hex } => {
            let decoded = decode_transaction_hex(&hex, config.network, &NoContext)?;
            println!("{}", serde_json::to_string_pretty(&decoded)?);
            Ok(())
        }
    }
}

async fn run_session(config: SessionConfig, run: RunArgs) -> eyre::Result<()> {
    let network = config.network;
    // Open waits on the index lock; keep it off the async workers.
    let session = tokio::task::spawn_blocking(move || Session::open(config))
        .await
        .wrap_err("session startup task failed")?
        .wrap_err("opening wallet session")?;

    if let Some(endpoint) = run.rpc_url {
        let rpc = HttpRpcClient::new(&RpcOptions {
            endpoint: endpoint.clone(),
            user: run.rpc_user,
            pass: run.rpc_pass,
            cookie_file: run.rpc_cookie,
        })
        .wrap_err("configuring rpc client")?;

        let chain_info = rpc
            .get_blockchain_info()
            .await
            .wrap_err_with(|| format!("while connecting to the node at {endpoint}"))?;
        match chain_info.network() {
            Some(node_network) if node_network == network => {}
            Some(node_network) => {
                session.shutdown(false);
                bail!("node is on {node_network}, session is on {network}");
            }
            None => {
                session.shutdown(false);
                bail!("unrecognized chain name `{}` from getblockchaininfo", chain_info.chain);
            }
        }
        tracing::info!(
            chain = %chain_info.chain,
            blocks = chain_info.blocks,
            "connected to node"
        );
        if chain_info.pruned {
            tracing::warn!("node is pruned; old transactions may be unavailable");
        }
        session.attach_rpc_client(Arc::new(rpc))?;
    }

    let resume = session.with_index(|index| index.resume_height())?;
    tracing::info!(resume_height = resume, "index ready");

    println!();
    println!("  libwallet session is running:");
    println!("    network:  {network}");
    println!("    data dir: {}", session.data_dir().display());
    println!();
    println!("  Press Ctrl+C to stop.");

    session.wait_terminated().await;
    tracing::info!("session terminated");
    Ok(())
}
