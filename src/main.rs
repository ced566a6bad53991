#[tokio::main]
async fn main() {
    if let Err(e) = erpgate::run().await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}
