use std::collections::BTreeMap;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::io::{AsyncSink, AsyncSource};
use crate::store_path::{StoreDir, StorePathSet};

use super::aterm::{parse_output, parse_path};
use super::{
    BasicDerivation, Derivation, InputDerivations, ReadDerivationError, parse_output_name,
};

impl BasicDerivation {
    pub async fn read_drv<R>(
        source: &mut R,
        store_dir: &StoreDir,
    ) -> Result<BasicDerivation, ReadDerivationError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let nr = source.read_usize().await?;
        let mut outputs = BTreeMap::new();
        for _n in 0..nr {
            let name = source.read_string().await?;
            let path = source.read_string().await?;
            let hash_algo = source.read_string().await?;
            let hash = source.read_string().await?;
            let output = parse_output(store_dir, &name, &path, &hash_algo, &hash)?;
            outputs.insert(parse_output_name(&name)?, output);
        }
        let input_srcs = read_paths(source, store_dir).await?;
        let platform = source.read_string().await?;
        let builder = source.read_string().await?;
        let args = source.read_string_coll().await?;

        let nr = source.read_usize().await?;
        let mut env = BTreeMap::new();
        for _n in 0..nr {
            let name = source.read_string().await?;
            let value = source.read_string().await?;
            env.insert(name, value);
        }
        Ok(BasicDerivation {
            outputs,
            input_srcs,
            platform,
            builder,
            args,
            env,
        })
    }

    pub async fn write_drv<W>(&self, sink: &mut W, store_dir: &StoreDir) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        sink.write_usize(self.outputs.len()).await?;
        for (name, output) in self.outputs.iter() {
            sink.write_string(name.as_ref()).await?;
            sink.write_string(&store_dir.print_path(&output.path)).await?;
            sink.write_string(&output.hash_algo()).await?;
            sink.write_string(&output.hash_hex()).await?;
        }
        sink.write_string_coll(self.input_srcs.iter().map(|path| store_dir.print_path(path)))
            .await?;
        sink.write_string(&self.platform).await?;
        sink.write_string(&self.builder).await?;
        sink.write_string_coll(&self.args).await?;

        sink.write_usize(self.env.len()).await?;
        for (name, value) in self.env.iter() {
            sink.write_string(name).await?;
            sink.write_string(value).await?;
        }
        Ok(())
    }
}

impl Derivation {
    pub async fn read_drv<R>(
        source: &mut R,
        store_dir: &StoreDir,
    ) -> Result<Derivation, ReadDerivationError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let basic = BasicDerivation::read_drv(source, store_dir).await?;
        let nr = source.read_usize().await?;
        let mut input_drvs = InputDerivations::new();
        for _n in 0..nr {
            let path = parse_path(store_dir, &source.read_string().await?)?;
            let names: Vec<String> = source.read_string_coll().await?;
            let outputs = names
                .iter()
                .map(|name| parse_output_name(name))
                .collect::<Result<_, _>>()?;
            input_drvs.insert(path, outputs);
        }
        Ok(Derivation { basic, input_drvs })
    }

    pub async fn write_drv<W>(&self, sink: &mut W, store_dir: &StoreDir) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.basic.write_drv(sink, store_dir).await?;
        sink.write_usize(self.input_drvs.len()).await?;
        for (path, outputs) in self.input_drvs.iter() {
            sink.write_string(&store_dir.print_path(path)).await?;
            sink.write_string_coll(outputs).await?;
        }
        Ok(())
    }
}

async fn read_paths<R>(source: &mut R, store_dir: &StoreDir) -> Result<StorePathSet, ReadDerivationError>
where
    R: AsyncRead + Unpin + Send,
{
    let paths: Vec<String> = source.read_string_coll().await?;
    Ok(paths
        .iter()
        .map(|path| parse_path(store_dir, path))
        .collect::<Result<_, _>>()?)
}
