//! tandem: keep several connections to one line-protocol server alive.
//!
//! Each connection identifies itself on startup (`NICK`/`USER`) and answers
//! `PING` with `PONG`; everything received is logged at debug level.
//!
//! Configuration via CLI arguments or TOML file; see `config`.

use tandem::config::{Config, IdentityConfig};
use tandem::{ConnectionPool, Params, SETUP_KEY};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.pool.host,
        port = config.pool.port,
        connections = config.pool.connections,
        tls = config.pool.tls,
        capacity = config.pool.capacity,
        fill_rate = config.pool.fill_rate,
        encoding = %config.pool.encoding,
        "Starting tandem"
    );

    let mut pool = ConnectionPool::connect(config.pool.clone())?;
    register_handlers(&mut pool, &config.identity);

    pool.run()?;
    info!("tandem stopped");
    Ok(())
}

fn register_handlers(pool: &mut ConnectionPool, identity: &IdentityConfig) {
    let params = Params::new()
        .with("nick", identity.nick.as_str())
        .with("user", identity.user.as_str())
        .with("realname", identity.realname.as_str());

    pool.on_with(SETUP_KEY, params, |pool, event, params| {
        let nick = format!("{}{}", params.get("nick").unwrap_or("tandem"), event.index);
        let user = params.get("user").unwrap_or("tandem");
        let realname = format!(":{}", params.get("realname").unwrap_or(user));

        pool.send_to(event.index, &["NICK".into(), nick.into()])?;
        pool.send_to(
            event.index,
            &["USER".into(), user.into(), "0".into(), "*".into(), realname.into()],
        )?;
        Ok(())
    });

    pool.on("ping", |pool, event, _params| {
        let token = event.arg(0).map(|token| format!(":{token}"));
        pool.send_to(event.index, &["PONG".into(), token.into()])?;
        Ok(())
    });
}
