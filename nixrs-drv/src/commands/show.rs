use std::fmt::Write as _;

use clap::Args as OtherArgs;
use nixrs_derivation::store::DerivationStore as _;

use crate::{App, Error};

#[derive(Clone, OtherArgs)]
pub struct Args {
    drv_path: String,
}

pub async fn run_command(app: &App, args: Args) -> Result<(), Error> {
    let store = app.store();
    let drv_path = app.store_dir.parse_path(&args.drv_path)?;
    let drv = store.read_derivation(&drv_path).await?;

    let store_dir = &app.store_dir;
    let mut text = String::new();
    let _ = writeln!(text, "{}", store_dir.display(&drv_path));
    if let Some(name) = drv_path.derivation_name() {
        let _ = writeln!(text, "  name: {name}");
    }
    let _ = writeln!(text, "  platform: {}", drv.platform);
    let _ = writeln!(text, "  builder: {}", drv.builder);
    let _ = writeln!(text, "  outputs:");
    for (name, output) in drv.outputs.iter() {
        match &output.hash {
            Some(hash) => {
                let _ = writeln!(
                    text,
                    "    {name}: {} ({hash})",
                    store_dir.display(&output.path)
                );
            }
            None => {
                let _ = writeln!(text, "    {name}: {}", store_dir.display(&output.path));
            }
        }
    }
    let _ = writeln!(text, "  input derivations:");
    for (path, outputs) in drv.input_drvs.iter() {
        let outputs: Vec<&str> = outputs.iter().map(|o| o.as_ref()).collect();
        let _ = writeln!(
            text,
            "    {} [{}]",
            store_dir.display(path),
            outputs.join(", ")
        );
    }
    let _ = writeln!(text, "  input sources:");
    for path in drv.input_srcs.iter() {
        let _ = writeln!(text, "    {}", store_dir.display(path));
    }
    app.print(&drv, text.trim_end().to_string())
}
