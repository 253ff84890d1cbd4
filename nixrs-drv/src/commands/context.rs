use clap::Args as OtherArgs;
use nixrs_derivation::context::NixStringContextElem;
use serde::Serialize;

use crate::{App, Error};

#[derive(Clone, OtherArgs)]
pub struct Args {
    #[arg(required = true)]
    elems: Vec<String>,
}

#[derive(Serialize)]
struct Parsed {
    kind: &'static str,
    path: String,
    canonical: NixStringContextElem,
}

pub fn run_command(app: &App, args: Args) -> Result<(), Error> {
    let mut parsed = Vec::with_capacity(args.elems.len());
    for elem in args.elems.iter() {
        let elem = NixStringContextElem::parse(elem, &app.experimental_features)?;
        let kind = match &elem {
            NixStringContextElem::Opaque(_) => "opaque",
            NixStringContextElem::DrvDeep(_) => "drv-deep",
            NixStringContextElem::Built { .. } => "built",
        };
        parsed.push(Parsed {
            kind,
            path: app.store_dir.print_path(elem.store_path()),
            canonical: elem,
        });
    }
    let text = parsed
        .iter()
        .map(|p| format!("{} {} {}", p.kind, p.canonical, p.path))
        .collect::<Vec<_>>()
        .join("\n");
    app.print(&parsed, text)
}
