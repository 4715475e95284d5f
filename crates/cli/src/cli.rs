use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "manifest-sig",
    about = "Verify Sigstore signatures on container images and blobs",
    long_about = "Verify cosign signatures attached to container images, or detached \
                  signatures over arbitrary blobs, with a public key or keyless (Fulcio + Rekor)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Clone, Debug)]
pub struct GlobalArgs {
    /// Output machine-readable JSON to stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging (sets RUST_LOG=debug if not already set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Rekor URL (default: $REKOR_SERVER or https://rekor.sigstore.dev)
    #[arg(long, global = true)]
    pub rekor_url: Option<String>,

    /// Trusted root JSON to use instead of the Sigstore TUF repository
    #[arg(long, global = true)]
    pub trusted_root: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify the signatures attached to a container image
    VerifyImage {
        /// Image reference, e.g. ghcr.io/org/app:1.0 or ghcr.io/org/app@sha256:...
        image: String,

        /// Public key: file path or env://VAR (keyless when omitted)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Verify a detached signature over a blob
    VerifyBlob {
        /// File holding the base64 (optionally gzip) encoded message
        #[arg(long)]
        message: PathBuf,

        /// File holding the encoded signature
        #[arg(long)]
        signature: PathBuf,

        /// File holding the encoded PEM certificate (required for keyless)
        #[arg(long)]
        certificate: Option<PathBuf>,

        /// File holding the encoded Rekor bundle, tried offline first
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Public key: file path or env://VAR (keyless when omitted)
        #[arg(short, long)]
        key: Option<String>,
    },
}
