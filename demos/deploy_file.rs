use std::error::Error;

use airlift_sdk::client::Connector;
use airlift_sdk::gateway::RequestOptions;
use serde_json::json;

fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Reads AIRLIFT_USERNAME / AIRLIFT_SECRET from the environment.
        let connector = Connector::from_env()?;

        let session = connector.initialize().await?;
        println!("connected to {} as {}", session.base_url, session.username);

        let manifest = connector
            .api_request("status", RequestOptions::get())
            .await?;
        println!("service status: {manifest}");

        let response = connector
            .upload_file(
                b"hello from the airlift sdk\n".to_vec(),
                "hello.txt",
                "/srv/demo/hello.txt",
            )
            .await?;
        println!("uploaded: {response}");

        let release = connector
            .api_request(
                "deploys",
                RequestOptions::post(json!({"path": "/srv/demo", "tag": "demo"})),
            )
            .await?;
        println!("deploy requested: {release}");

        connector.disconnect().await;
        Ok::<(), Box<dyn Error>>(())
    })
}
