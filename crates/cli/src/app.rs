use crate::cli::Cli;
use crate::json::ErrorJson;
use anyhow::Result;
use console::style;

/// The step a failure happened in, attached to errors as context and
/// reported through the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadInput,
    ReadKeyPair,
    ParseKeyPair,
    Sign,
    WriteOutput,
}

impl Stage {
    pub fn exit_code(self) -> u8 {
        match self {
            Stage::ReadInput => 1,
            Stage::ReadKeyPair => 2,
            Stage::ParseKeyPair => 3,
            Stage::Sign => 4,
            Stage::WriteOutput => 5,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::ReadInput => "Failed to read the input document",
            Stage::ReadKeyPair => "Failed to read the key pair",
            Stage::ParseKeyPair => "Failed to load the key pair",
            Stage::Sign => "Failed to sign the document",
            Stage::WriteOutput => "Failed to write the signed document",
        })
    }
}

/// Exit status for a failed run; errors without a stage count as usage errors.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<Stage>()
        .map_or(1, |stage| stage.exit_code())
}

pub fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    let result = crate::sign::sign_pdf(cli);

    if let Err(e) = &result {
        if json {
            let causes: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
            let payload = ErrorJson {
                status: "error",
                error: e.to_string(),
                causes,
                exit_code: exit_code(e),
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
