use std::path::{Path, PathBuf};

use clap::Args as OtherArgs;
use nixrs_derivation::derivation::Derivation;
use nixrs_derivation::store::{RepairFlag, write_derivation};
use nixrs_derivation::store_path::StorePath;

use crate::{App, Error};

#[derive(Clone, OtherArgs)]
pub struct Args {
    /// Derivation in ATerm form.
    file: PathBuf,
    /// Name of the derivation, without the `.drv` extension. Defaults to the
    /// name of FILE when it is a derivation store path.
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    repair: bool,
}

fn name_from_file(file: &Path) -> Option<String> {
    let base_name = file.file_name()?.to_str()?;
    let path: StorePath = base_name.parse().ok()?;
    path.derivation_name().map(str::to_owned)
}

pub async fn run_command(app: &App, args: Args) -> Result<(), Error> {
    let name = match args.name {
        Some(name) => name,
        None => name_from_file(&args.file).ok_or_else(|| Error::NoName(args.file.clone()))?,
    };
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|source| Error::Read {
            path: args.file.clone(),
            source,
        })?;
    let drv = Derivation::parse(&app.store_dir, &text).map_err(|source| Error::Parse {
        path: args.file.clone(),
        source,
    })?;
    let store = app.store();
    let path = write_derivation(&store, &drv, &name, RepairFlag::from(args.repair)).await?;
    let printed = app.store_dir.print_path(&path);
    app.print(&printed, printed.clone())
}

#[cfg(test)]
mod unittests {
    use std::path::Path;

    use super::name_from_file;

    #[test]
    fn name_from_derivation_file() {
        let file = Path::new("/tmp/drvs/7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-hello-2.12.drv");
        assert_eq!(name_from_file(file).as_deref(), Some("hello-2.12"));
    }

    #[test]
    fn no_name_from_other_files() {
        assert_eq!(name_from_file(Path::new("hello.drv")), None);
        assert_eq!(
            name_from_file(Path::new("7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-hello")),
            None
        );
        assert_eq!(name_from_file(Path::new("/")), None);
    }
}
