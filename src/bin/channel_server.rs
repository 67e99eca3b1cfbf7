use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;

use astra::config::ServerConfig;
use astra::coordinator::{LoginBypassRegistry, SessionRegistry};
use astra::database::ban::SqlBanList;
use astra::database::mysql::MySqlAccountStore;
use astra::database::postgres::PgAccountStore;
use astra::database::{AccountStore, DualAccountStore};
use astra::network::connection::run_acceptor;
use astra::network::packet::opcode;
use astra::network::{LivenessMonitor, PacketProcessor, PongHandler};
use astra::session::{SessionContext, SessionKind};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/server.yaml".to_string();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: channel_server [--conf FILE]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            _ => {}
        }
        i += 1;
    }

    let config = Arc::new(
        ServerConfig::from_file(&conf_file)
            .with_context(|| format!("Cannot load config: {}", conf_file))?,
    );

    let pg_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.postgres_url())
        .await
        .with_context(|| format!("Cannot connect to Postgres: {}", config.pg_ip))?;

    let mysql_pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect(&config.mysql_url())
        .await
        .with_context(|| format!("Cannot connect to MySQL: {}", config.sql_ip))?;

    let legacy: Option<Arc<dyn AccountStore>> = if config.legacy_writes {
        Some(Arc::new(MySqlAccountStore::new(mysql_pool.clone())))
    } else {
        None
    };
    let store: Arc<dyn AccountStore> = Arc::new(DualAccountStore::new(
        Arc::new(PgAccountStore::new(pg_pool)),
        legacy,
    ));

    let registry = Arc::new(SessionRegistry::new());
    let ctx = Arc::new(SessionContext {
        config: Arc::clone(&config),
        store,
        bans: Arc::new(SqlBanList::new(mysql_pool)),
        registry: Arc::clone(&registry),
        bypass: Arc::new(LoginBypassRegistry::new()),
    });

    let mut processor = PacketProcessor::new(Arc::clone(&registry));
    processor.register(opcode::PONG, Arc::new(PongHandler));
    // In-game handlers (movement, combat, trade, scripting) register here.

    tracing::info!(
        "[channel] [started] Channel Server Started world={} channel={}",
        config.world_id,
        config.channel_id
    );

    let bind = format!("{}:{}", config.channel_ip, config.channel_port);
    run_acceptor(
        SessionKind::Channel,
        &bind,
        ctx,
        Arc::new(processor),
        Arc::new(LivenessMonitor::new()),
    )
    .await?;
    Ok(())
}
