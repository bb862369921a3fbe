use std::sync::Arc;

use badserver::Config;
use badserver::config::{DEFAULT_ADMIN_PORT, DEFAULT_PORT};
use badserver_core::telemetry;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "An HTTP server that misbehaves on request", long_about = None)]
struct Args {
	/// The port to listen on
	#[arg(long, default_value_t = DEFAULT_PORT)]
	port: u16,

	/// The port serving the /headers admin surface
	#[arg(long = "adminPort", default_value_t = DEFAULT_ADMIN_PORT)]
	admin_port: u16,
}

fn main() -> anyhow::Result<()> {
	telemetry::setup_logging();
	let args = Args::parse();
	let config = Config::with_ports(args.port, args.admin_port);

	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(async move {
			badserver::app::run(Arc::new(config))
				.await?
				.wait_termination()
				.await
		})
}
