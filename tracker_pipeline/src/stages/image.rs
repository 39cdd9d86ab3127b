use dagger_sdk::{Directory, Query};

use crate::containers;

/// Build the runtime image and smoke-test the binary inside it.
pub async fn run(client: &Query, source: Directory) -> eyre::Result<String> {
    let output = containers::runtime_image(client, source)
        .with_exec(vec![containers::BINARY, "--help"])
        .stdout()
        .await?;

    Ok(format!("[image] Runtime image built.\n{output}"))
}

/// Build the runtime image and push it to `address`.
pub async fn publish(client: &Query, source: Directory, address: &str) -> eyre::Result<String> {
    let reference = containers::runtime_image(client, source)
        .publish(address)
        .await?;

    Ok(format!("[publish] Pushed {reference}"))
}
