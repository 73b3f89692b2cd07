use clap::Parser;
use micro_mllp::handler::AckMiddleware;
use micro_mllp::log::TracingMessageLog;
use micro_mllp::protocol::SegmentParser;
use micro_mllp::tls::ServerCertificate;
use micro_mllp_server::Server;
use micro_mllp_server::settings::Settings;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Receives HL7 messages over MLLP and acknowledges each of them.
#[derive(Parser, Debug)]
#[command(name = "mllp-server", version)]
struct Cli {
    /// TOML settings file; built-in defaults are used without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the settings file.
    #[arg(short, long)]
    address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(address) = cli.address {
        settings.server.address = address;
    }

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&settings.log.level))?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut builder = Server::builder()
        .apply_settings(&settings.server)
        .log_sink(TracingMessageLog)
        .middleware(AckMiddleware::new())
        .parser(SegmentParser);

    if let Some(tls) = &settings.tls {
        let certificate = ServerCertificate::from_pem_files(&tls.certificate, &tls.private_key)?;
        info!(certificate = %tls.certificate.display(), "tls enabled");
        builder = builder.certificate(certificate);
    }

    let mut server = builder.build()?;
    server.start()?;
    info!(address = %server.local_addr(), "mllp server is ready, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");
    server.shutdown().await?;

    Ok(())
}
