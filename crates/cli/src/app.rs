use crate::cli::{Cli, Commands};
use crate::commands::BlobFiles;
use crate::json::ErrorJson;
use anyhow::Result;
use console::style;

pub fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    let json = global.json;

    let result = match cli.command {
        Commands::VerifyImage { image, key } => crate::commands::verify_image(image, key, &global),

        Commands::VerifyBlob {
            message,
            signature,
            certificate,
            bundle,
            key,
        } => crate::commands::verify_blob(
            BlobFiles {
                message,
                signature,
                certificate,
                bundle,
            },
            key,
            &global,
        ),
    };

    if let Err(e) = &result {
        if json {
            let causes: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
            let payload = ErrorJson {
                status: "error",
                error: e.to_string(),
                causes,
            };
            println!("{}", serde_json::to_string(&payload)?);
        } else {
            eprintln!("\n{} {}", style("[ERROR]").red().bold(), style(&e).red());

            for (i, cause) in e.chain().skip(1).enumerate() {
                if i == 0 {
                    eprintln!("\n    Caused by:");
                }
                eprintln!("      - {}", style(cause).red());
            }
            eprintln!();
        }
    }

    result
}
