use mpship::exec;

#[tokio::main]
async fn main() {
    match exec().await {
        Ok(_) => (),
        Err(e) => log::error!("Error: {}", e),
    }
}
