use std::collections::BTreeMap;

use clap::Args as OtherArgs;
use nixrs_derivation::derivation::hash_placeholder;

use crate::{App, Error};

#[derive(Clone, OtherArgs)]
pub struct Args {
    #[arg(required = true)]
    outputs: Vec<String>,
}

pub fn run_command(app: &App, args: Args) -> Result<(), Error> {
    let placeholders: BTreeMap<&str, String> = args
        .outputs
        .iter()
        .map(|output| (output.as_str(), hash_placeholder(output)))
        .collect();
    let text = args
        .outputs
        .iter()
        .map(|output| format!("{output} {}", placeholders[output.as_str()]))
        .collect::<Vec<_>>()
        .join("\n");
    app.print(&placeholders, text)
}
