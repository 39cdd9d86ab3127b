mod containers;
mod stages;

use clap::{Parser, Subcommand};
use dagger_sdk::{Directory, HostDirectoryOpts, Query};

#[derive(Parser)]
#[command(name = "certificate-tracker-pipeline", about = "Certificate Tracker CI/CD Pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fast compile check
    Check {
        #[arg(long, default_value = ".")]
        source: String,
    },
    /// Format check
    Fmt {
        #[arg(long, default_value = ".")]
        source: String,
    },
    /// Clippy lint
    Lint {
        #[arg(long, default_value = ".")]
        source: String,
    },
    /// Unit and database tests
    Test {
        #[arg(long, default_value = ".")]
        source: String,
    },
    /// Boot the server against PostgreSQL and drive its HTTP flows
    #[command(name = "integration-test")]
    IntegrationTest {
        #[arg(long, default_value = ".")]
        source: String,
    },
    /// Build the runtime container image
    Image {
        #[arg(long, default_value = ".")]
        source: String,
    },
    /// Build and push the runtime image
    Publish {
        #[arg(long, default_value = ".")]
        source: String,
        /// Registry reference, e.g. registry.example.edu/certificate-tracker:latest
        #[arg(long)]
        address: String,
    },
    /// Security audit
    #[command(name = "security-audit")]
    SecurityAudit {
        #[arg(long, default_value = ".")]
        source: String,
    },
    /// Full pipeline (check + fmt + lint + test + integration + image)
    All {
        #[arg(long, default_value = ".")]
        source: String,
    },
}

fn host_directory(client: &Query, source: &str) -> Directory {
    client.host().directory_opts(
        source,
        HostDirectoryOpts {
            exclude: Some(vec!["target/", ".git/", "staticfiles/", "media/", "logs/"]),
            include: None,
            gitignore: None,
            no_cache: None,
        },
    )
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let Cli { command } = Cli::parse();

    dagger_sdk::connect(|client| async move {
        match command {
            Command::Check { source } => {
                let src = host_directory(&client, &source);
                let out = stages::check::run(&client, src).await?;
                println!("{out}");
            }
            Command::Fmt { source } => {
                let src = host_directory(&client, &source);
                let out = stages::fmt::run(&client, src).await?;
                println!("{out}");
            }
            Command::Lint { source } => {
                let src = host_directory(&client, &source);
                let out = stages::lint::run(&client, src).await?;
                println!("{out}");
            }
            Command::Test { source } => {
                let src = host_directory(&client, &source);
                let out = stages::test::run(&client, src).await?;
                println!("{out}");
            }
            Command::IntegrationTest { source } => {
                let src = host_directory(&client, &source);
                let out = stages::integration::run(&client, src).await?;
                println!("{out}");
            }
            Command::Image { source } => {
                let src = host_directory(&client, &source);
                let out = stages::image::run(&client, src).await?;
                println!("{out}");
            }
            Command::Publish { source, address } => {
                let src = host_directory(&client, &source);
                let out = stages::image::publish(&client, src, &address).await?;
                println!("{out}");
            }
            Command::SecurityAudit { source } => {
                let src = host_directory(&client, &source);
                let out = stages::security::run(&client, src).await?;
                println!("{out}");
            }
            Command::All { source } => {
                let src = host_directory(&client, &source);

                println!("=== Phase 1: Fast Gates ===");
                let (check_out, fmt_out) = tokio::try_join!(
                    stages::check::run(&client, src.clone()),
                    stages::fmt::run(&client, src.clone()),
                )?;
                println!("{check_out}\n{fmt_out}");

                println!("=== Phase 2: Quality Gates ===");
                let (lint_out, test_out) = tokio::try_join!(
                    stages::lint::run(&client, src.clone()),
                    stages::test::run(&client, src.clone()),
                )?;
                println!("{lint_out}\n{test_out}");

                println!("=== Phase 3: Integration ===");
                let int_out = stages::integration::run(&client, src.clone()).await?;
                println!("{int_out}");

                println!("=== Phase 4: Image ===");
                let image_out = stages::image::run(&client, src).await?;
                println!("{image_out}");

                println!("\n=== Full CI Pipeline Complete ===");
            }
        }
        Ok(())
    })
    .await?;

    Ok(())
}
