use quarry_server::QuarryServer;

#[derive(clap::Parser)]
struct Args {
    #[arg(long, default_value = "config/quarry.yaml")]
    config: String,

    #[arg(long, default_value_t = false)]
    observability: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    QuarryServer::new()
        .with_config(&args.config)
        .with_observability(args.observability)
        .run()
        .await
}
