use std::error::Error;

use airlift_sdk::client::Connector;

fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Reads AIRLIFT_USERNAME / AIRLIFT_SECRET from the environment.
        let connector = Connector::from_env()?;

        let session = connector.initialize().await?;
        println!("connected to {}", session.stream_url);

        let mut handle = connector.connect_stream().await?;
        while let Some(event) = handle.recv().await {
            match event.get("type").and_then(|kind| kind.as_str()) {
                Some("deploy_completed") => println!("deploy completed: {event}"),
                Some("deploy_failed") => println!("deploy failed: {event}"),
                Some("file_changed") => println!("file changed: {event}"),
                _ => println!("event: {event}"),
            }
        }
        println!("stream closed");

        connector.disconnect().await;
        Ok::<(), Box<dyn Error>>(())
    })
}
