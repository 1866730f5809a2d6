//! Node entry point.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use smgw_cluster::ClusterNode;
use smgw_core::config::ConfigStore;
use smgw_core::session::SessionConfig;
use smgw_crypto::ScrambleKey;
use smgw_server::cli::{Cli, CliCommand, parse_connect_target, render_config, run_set_config};
use smgw_server::config::{JsonBackend, load_config, seed_config_store};
use smgw_server::driver::ServerDriver;
use smgw_server::error::ServerError;
use smgw_server::nms::NmsReader;
use smgw_server::transport::IptListener;
use smgw_server::{FileConfig, nms};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        },
    }
}

fn run(mut cli: Cli) -> Result<(), ServerError> {
    match cli.command.take() {
        None => run_node(&cli),
        Some(CliCommand::InitDb) => {
            let config = load_config(&cli.config, cli.config_index)?;
            let _ = open_store(&config)?;
            println!("configuration storage initialised");
            Ok(())
        },
        Some(CliCommand::TransferConfig) => {
            let config = load_config(&cli.config, cli.config_index)?;
            let mut store = open_store(&config)?;
            seed_config_store(&config, &mut store)?;
            println!("transferred {} entries", store.len());
            Ok(())
        },
        Some(CliCommand::ListConfig) => {
            let config = load_config(&cli.config, cli.config_index)?;
            let store = open_store(&config)?;
            for line in render_config(&store) {
                println!("{line}");
            }
            Ok(())
        },
        Some(CliCommand::ClearConfig) => {
            let config = load_config(&cli.config, cli.config_index)?;
            let mut store = open_store(&config)?;
            let paths: Vec<String> = store.iter().map(|(p, _)| p.to_string()).collect();
            for path in &paths {
                store.remove_cfg(path)?;
            }
            println!("removed {} entries", paths.len());
            Ok(())
        },
        Some(CliCommand::SetConfig { path, value, ty }) => {
            let config = load_config(&cli.config, cli.config_index)?;
            let mut store = open_store(&config)?;
            run_set_config(&mut store, &path, &value, &ty)?;
            Ok(())
        },
        Some(CliCommand::DumpProfile { number }) => {
            let config = load_config(&cli.config, cli.config_index)?;
            let store = open_store(&config)?;
            let prefix = format!("profile/{number}");
            for (path, value) in store.section(&prefix) {
                println!("{path} = {value:?}");
            }
            Ok(())
        },
        Some(CliCommand::TryConnect { target }) => {
            let target = parse_connect_target(&target)?;
            try_connect(&target)
        },
        Some(CliCommand::CreateConfig) => {
            create_config(&cli)
        },
    }
}

/// Open the configuration storage named in the `DB` block.
fn open_store(config: &FileConfig) -> Result<ConfigStore, ServerError> {
    let file = config
        .db
        .get("file-name")
        .cloned()
        .unwrap_or_else(|| "smgw-store.json".to_string());
    let backend = JsonBackend::open(file)?;
    ConfigStore::open(Box::new(backend)).map_err(ServerError::from)
}

/// Run the node: IP-T listener plus optional NMS listener.
fn run_node(cli: &Cli) -> Result<(), ServerError> {
    let config = load_config(&cli.config, cli.config_index)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let mut store = open_store(&config)?;
    seed_config_store(&config, &mut store)?;
    let store = Arc::new(Mutex::new(store));

    let accounts = HashMap::from([(config.sml.account.clone(), config.sml.pwd.clone())]);
    let node = ClusterNode::new(accounts.clone());
    let driver = Arc::new(Mutex::new(ServerDriver::new(
        SessionConfig::default(),
        accounts,
        config.sml.accept_all_ids,
        node,
    )));

    let initial_key = config
        .ipt
        .first()
        .and_then(|r| r.def_sk.parse::<ScrambleKey>().ok())
        .unwrap_or(ScrambleKey::NULL);

    let runtime = tokio::runtime::Runtime::new().map_err(ServerError::from)?;
    runtime.block_on(async move {
        let sml_addr = format!("{}:{}", config.sml.address, config.sml.service);
        let listener = IptListener::bind(&sml_addr, Arc::clone(&driver), initial_key).await?;

        if let Some(block) = config.nms.as_ref().filter(|block| block.enabled) {
            let nms_addr = format!("{}:{}", block.address, block.service);
            let reader = Arc::new(NmsReader::new(
                block.account.clone(),
                block.pwd.clone(),
                block.script_path.clone(),
                Arc::clone(&store),
            ));
            tokio::spawn(async move {
                if let Err(err) = nms::serve(&nms_addr, reader).await {
                    tracing::error!("nms listener failed: {err}");
                }
            });
        }

        listener.run().await
    })
}

/// Probe an IP-T master with a public login.
fn try_connect(target: &smgw_server::cli::ConnectTarget) -> Result<(), ServerError> {
    use smgw_proto::ipt::payload::{LoginPublicReq, LoginRes};
    use smgw_proto::ipt::response::LoginCode;
    use smgw_proto::ipt::{Command, FrameReader, codec::encode_frame};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let runtime = tokio::runtime::Runtime::new().map_err(ServerError::from)?;
    runtime.block_on(async {
        let endpoint = format!("{}:{}", target.host, target.port);
        let mut stream = tokio::net::TcpStream::connect(&endpoint)
            .await
            .map_err(|e| ServerError::Transport(format!("cannot reach '{endpoint}': {e}")))?;

        let req = LoginPublicReq { name: target.user.clone(), pwd: target.pwd.clone() };
        let frame = encode_frame(Command::CtrlReqLoginPublic, 1, &req.encode());
        stream.write_all(&frame).await?;

        let mut reader = FrameReader::new();
        let mut buffer = vec![0u8; 1024];
        loop {
            let n = stream.read(&mut buffer).await?;
            if n == 0 {
                return Err(ServerError::Transport("peer closed during login".to_string()));
            }
            reader.push(&buffer[..n]);
            if let Some(result) = reader.next() {
                let (header, body) =
                    result.map_err(|e| ServerError::Protocol(e.to_string()))?;
                if header.command != Command::CtrlResLoginPublic {
                    continue;
                }
                let res = LoginRes::decode(&body)
                    .map_err(|e| ServerError::Protocol(e.to_string()))?;
                let code = LoginCode::from_u8(res.code);
                println!("login: {code:?}, watchdog {} min", res.watchdog);
                if !code.is_success() {
                    return Err(ServerError::Protocol(format!("login failed: {code:?}")));
                }
                return Ok(());
            }
        }
    })
}

/// Write a default configuration file next to the node.
fn create_config(cli: &Cli) -> Result<(), ServerError> {
    let sample = serde_json::json!([{
        "log-dir": ".",
        "log-level": "info",
        "tag": uuid::Uuid::new_v4(),
        "DB": { "file-name": "smgw-store.json" },
        "sml": {
            "address": "0.0.0.0",
            "service": "26862",
            "discover": false,
            "account": "operator",
            "pwd": "operator",
            "enabled": true,
            "accept-all-ids": false
        },
        "nms": {
            "address": "0.0.0.0",
            "service": "7261",
            "account": "admin",
            "pwd": "admin",
            "enabled": false,
            "script-path": "/tmp/update.sh"
        },
        "ipt": [{
            "host": "127.0.0.1",
            "service": "26862",
            "account": "gateway",
            "pwd": "gateway",
            "def-sk": "0000000000000000000000000000000000000000000000000000000000000000",
            "scrambled": true,
            "monitor": 57
        }],
        "wireless-LMN": { "protocol": "1", "enabled": "true" },
        "hardware": { "manufacturer": "solosTec", "model": "smgw" }
    }]);
    let text = serde_json::to_string_pretty(&sample)?;
    std::fs::write(&cli.config, text)
        .map_err(|e| ServerError::Config(format!("cannot write '{}': {e}", cli.config.display())))?;
    println!("wrote {}", cli.config.display());
    Ok(())
}
