use std::collections::BTreeMap;
use std::fmt::Write as _;

use clap::Args as OtherArgs;
use nixrs_derivation::derivation::{DrvHashModulo, DrvHashes, hash_derivation_path};

use crate::{App, Error};

#[derive(Clone, OtherArgs)]
pub struct Args {
    /// Full store paths of the derivations.
    #[arg(required = true)]
    drv_paths: Vec<String>,
}

pub async fn run_command(app: &App, args: Args) -> Result<(), Error> {
    let store = app.store();
    let drv_hashes = DrvHashes::new();
    let mut results = BTreeMap::new();
    let mut text = String::new();
    for arg in args.drv_paths {
        let drv_path = app.store_dir.parse_path(&arg)?;
        let hash = hash_derivation_path(&store, &drv_hashes, &drv_path).await?;
        match &hash {
            DrvHashModulo::Hash(hash) => {
                let _ = writeln!(text, "{arg} {hash:#x}");
            }
            DrvHashModulo::CaOutputHashes(outputs) => {
                for (output, hash) in outputs {
                    let _ = writeln!(text, "{arg}^{output} {hash:#x}");
                }
            }
        }
        results.insert(arg, hash);
    }
    app.print(&results, text.trim_end().to_string())
}
