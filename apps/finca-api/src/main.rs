use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = finca_api::Args::parse();
	finca_api::run(args).await
}
