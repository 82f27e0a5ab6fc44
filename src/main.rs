use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tokio::select! {
        result = volley::run() => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\ninterrupted; rows already flushed to the output CSV remain valid");
            std::process::exit(130);
        }
    }
}
