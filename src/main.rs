#[tokio::main]
async fn main() {
    mycomap::start_server().await;
}
