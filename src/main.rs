#[tokio::main]
async fn main() -> anyhow::Result<()> {
    squad_profiler_lib::run().await
}
