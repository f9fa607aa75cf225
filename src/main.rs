#[tokio::main]
async fn main() {
    if let Err(e) = paperloom_lib::run().await {
        eprintln!("paperloom: {e}");
        std::process::exit(1);
    }
}
