use dagger_sdk::{Container, Directory, Query, Service};

pub const BINARY: &str = "certificate-tracker";
pub const PORT: isize = 8000;

/// Rust build container with Diesel/PG deps and cargo caches.
pub fn rust_base(client: &Query, source: Directory) -> Container {
    client
        .container()
        .from("rust:1.85-bookworm")
        .with_exec(vec!["apt-get", "update"])
        .with_exec(vec![
            "apt-get", "install", "-y",
            "libpq-dev", "pkg-config", "build-essential", "postgresql-client",
        ])
        .with_mounted_cache(
            "/usr/local/cargo/registry",
            client.cache_volume("tracker-cargo-registry"),
        )
        .with_mounted_cache(
            "/usr/local/cargo/git",
            client.cache_volume("tracker-cargo-git"),
        )
        .with_mounted_cache(
            "/app/target",
            client.cache_volume("tracker-cargo-target"),
        )
        .with_workdir("/app")
        .with_directory("/app", source)
        .with_env_variable("CARGO_TARGET_DIR", "/app/target")
        .with_env_variable("RUST_BACKTRACE", "1")
}

/// Release build of the server; the binary is copied out of the target
/// cache to `/usr/local/bin` so later stages can read it.
pub fn release_build(client: &Query, source: Directory) -> Container {
    rust_base(client, source)
        .with_exec(vec![
            "cargo", "build", "--release", "--package", "certificate-tracker-server",
        ])
        .with_exec(vec![
            "cp", "/app/target/release/certificate-tracker", "/usr/local/bin/certificate-tracker",
        ])
}

/// PostgreSQL service for integration tests.
pub fn postgres(client: &Query) -> Service {
    client
        .container()
        .from("postgres:16-alpine")
        .with_env_variable("POSTGRES_DB", "tracker_test")
        .with_env_variable("POSTGRES_USER", "tracker")
        .with_env_variable("POSTGRES_PASSWORD", "tracker_password")
        .with_exposed_port(5432)
        .as_service()
}

/// Production image: slim Debian, the release binary, collected static
/// files and the runtime directories, listening on port 8000.
pub fn runtime_image(client: &Query, source: Directory) -> Container {
    let build = release_build(client, source.clone());

    client
        .container()
        .from("debian:bookworm-slim")
        .with_exec(vec!["apt-get", "update"])
        .with_exec(vec![
            "apt-get", "install", "-y", "--no-install-recommends",
            "libpq5", "ca-certificates",
        ])
        .with_exec(vec!["rm", "-rf", "/var/lib/apt/lists/*"])
        .with_file(
            "/usr/local/bin/certificate-tracker",
            build.file("/usr/local/bin/certificate-tracker"),
        )
        .with_workdir("/app")
        .with_directory("/app/tracker_server/static", source.directory("tracker_server/static"))
        .with_env_variable("RUST_LOG", "info")
        .with_env_variable("LOG_FORMAT", "json")
        .with_env_variable("STATIC_ROOT", "/app/staticfiles")
        .with_env_variable("STATICFILES_DIRS", "/app/tracker_server/static")
        .with_env_variable("MEDIA_ROOT", "/app/media")
        .with_env_variable("LOG_DIR", "/app/logs")
        .with_exec(vec!["mkdir", "-p", "/app/logs", "/app/media", "/app/staticfiles"])
        .with_exec(vec![BINARY, "collect-static"])
        .with_exposed_port(PORT)
        .with_entrypoint(vec![BINARY])
        .with_default_args(vec!["serve", "--port", "8000", "--workers", "3"])
}
