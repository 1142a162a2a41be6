mod host;
mod light;
mod poller;
mod slack;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
