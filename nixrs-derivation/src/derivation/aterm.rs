//! The canonical `Derive(...)` text of a derivation.
//!
//! This is both the content of `.drv` files and the input of every hash
//! computed over a derivation, so the output must stay byte for byte stable.

use std::collections::{BTreeMap, BTreeSet};

use crate::derived_path::OutputName;
use crate::store_path::{StoreDir, StorePath, StorePathSet};

use super::{
    BasicDerivation, Derivation, DerivationOutput, DerivationOutputHash, InputDerivations,
    ParseDerivationError, parse_output_name,
};

fn print_unquoted_string(out: &mut String, s: &str) {
    out.push('"');
    out.push_str(s);
    out.push('"');
}

fn print_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch => out.push(ch),
        }
    }
    out.push('"');
}

fn print_list<I, F>(out: &mut String, items: I, mut print: F)
where
    I: IntoIterator,
    F: FnMut(&mut String, I::Item),
{
    out.push('[');
    for (idx, item) in items.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        print(out, item);
    }
    out.push(']');
}

impl Derivation {
    /// Print this derivation in its canonical text form.
    ///
    /// With `mask_outputs` the paths of the outputs and the environment
    /// variables named after outputs are left empty. When `actual_inputs`
    /// is given it is printed in place of the input derivations.
    pub fn unparse(
        &self,
        store_dir: &StoreDir,
        mask_outputs: bool,
        actual_inputs: Option<&BTreeMap<String, BTreeSet<OutputName>>>,
    ) -> String {
        let mut s = String::with_capacity(65536);
        s.push_str("Derive(");

        print_list(&mut s, &self.outputs, |s, (name, output)| {
            s.push('(');
            print_unquoted_string(s, name.as_ref());
            s.push(',');
            if mask_outputs {
                print_unquoted_string(s, "");
            } else {
                print_unquoted_string(s, &store_dir.print_path(&output.path));
            }
            s.push(',');
            print_unquoted_string(s, &output.hash_algo());
            s.push(',');
            print_unquoted_string(s, &output.hash_hex());
            s.push(')');
        });

        s.push(',');
        let print_input = |s: &mut String, path: &str, outputs: &BTreeSet<OutputName>| {
            s.push('(');
            print_unquoted_string(s, path);
            s.push(',');
            print_list(s, outputs, |s, output| print_unquoted_string(s, output.as_ref()));
            s.push(')');
        };
        if let Some(actual_inputs) = actual_inputs {
            print_list(&mut s, actual_inputs, |s, (path, outputs)| {
                print_input(s, path, outputs)
            });
        } else {
            print_list(&mut s, &self.input_drvs, |s, (path, outputs)| {
                print_input(s, &store_dir.print_path(path), outputs)
            });
        }

        s.push(',');
        print_list(&mut s, &self.input_srcs, |s, path| {
            print_unquoted_string(s, &store_dir.print_path(path))
        });

        s.push(',');
        print_string(&mut s, &self.platform);
        s.push(',');
        print_string(&mut s, &self.builder);
        s.push(',');
        print_list(&mut s, &self.args, |s, arg| print_string(s, arg));

        s.push(',');
        print_list(&mut s, &self.env, |s, (key, value)| {
            s.push('(');
            print_string(s, key);
            s.push(',');
            let masked = mask_outputs
                && key
                    .parse::<OutputName>()
                    .is_ok_and(|name| self.outputs.contains_key(&name));
            print_string(s, if masked { "" } else { value });
            s.push(')');
        });

        s.push(')');
        s
    }

    /// Parse the canonical text form of a derivation.
    pub fn parse(store_dir: &StoreDir, s: &str) -> Result<Derivation, ParseDerivationError> {
        let mut p = Parser { input: s, pos: 0 };
        p.expect("Derive(")?;

        let mut outputs = BTreeMap::new();
        for (name, path, hash_algo, hash) in p.list(|p| {
            p.expect("(")?;
            let name = p.string()?;
            p.expect(",")?;
            let path = p.string()?;
            p.expect(",")?;
            let hash_algo = p.string()?;
            p.expect(",")?;
            let hash = p.string()?;
            p.expect(")")?;
            Ok((name, path, hash_algo, hash))
        })? {
            let output = parse_output(store_dir, &name, &path, &hash_algo, &hash)?;
            outputs.insert(parse_output_name(&name)?, output);
        }

        p.expect(",")?;
        let mut input_drvs = InputDerivations::new();
        for (path, names) in p.list(|p| {
            p.expect("(")?;
            let path = p.path(store_dir)?;
            p.expect(",")?;
            let names = p.list(|p| parse_output_name(&p.string()?))?;
            p.expect(")")?;
            Ok((path, names))
        })? {
            input_drvs.insert(path, names.into_iter().collect());
        }

        p.expect(",")?;
        let input_srcs: StorePathSet = p.list(|p| p.path(store_dir))?.into_iter().collect();
        p.expect(",")?;
        let platform = p.string()?;
        p.expect(",")?;
        let builder = p.string()?;
        p.expect(",")?;
        let args = p.list(Parser::string)?;
        p.expect(",")?;
        let env = p
            .list(|p| {
                p.expect("(")?;
                let key = p.string()?;
                p.expect(",")?;
                let value = p.string()?;
                p.expect(")")?;
                Ok((key, value))
            })?
            .into_iter()
            .collect();
        p.expect(")")?;
        if p.pos != s.len() {
            return Err(ParseDerivationError::TrailingData(p.pos));
        }

        Ok(Derivation {
            basic: BasicDerivation {
                outputs,
                input_srcs,
                platform,
                builder,
                args,
                env,
            },
            input_drvs,
        })
    }
}

pub(super) fn parse_output(
    store_dir: &StoreDir,
    name: &str,
    path: &str,
    hash_algo: &str,
    hash: &str,
) -> Result<DerivationOutput, ParseDerivationError> {
    if path.is_empty() {
        return Err(ParseDerivationError::UnsupportedOutput(name.to_string()));
    }
    let path = parse_path(store_dir, path)?;
    match (hash_algo.is_empty(), hash.is_empty()) {
        (true, true) => Ok(DerivationOutput::input_addressed(path)),
        (false, false) => Ok(DerivationOutput {
            path,
            hash: Some(DerivationOutputHash::parse(hash_algo, hash)?),
        }),
        _ => Err(ParseDerivationError::UnsupportedOutput(name.to_string())),
    }
}

pub(super) fn parse_path(store_dir: &StoreDir, s: &str) -> Result<StorePath, ParseDerivationError> {
    if !s.starts_with('/') {
        return Err(ParseDerivationError::BadPath(s.to_string()));
    }
    Ok(store_dir.parse_path(s)?)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), ParseDerivationError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(ParseDerivationError::expected(token, self.pos))
        }
    }

    fn string(&mut self) -> Result<String, ParseDerivationError> {
        let start = self.pos;
        self.expect("\"")?;
        let input = self.input;
        let mut res = String::new();
        let mut chars = input[self.pos..].char_indices();
        while let Some((idx, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.pos += idx + 1;
                    return Ok(res);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => res.push('\n'),
                    Some((_, 'r')) => res.push('\r'),
                    Some((_, 't')) => res.push('\t'),
                    Some((_, ch)) => res.push(ch),
                    None => break,
                },
                ch => res.push(ch),
            }
        }
        Err(ParseDerivationError::UnterminatedString(start))
    }

    fn path(&mut self, store_dir: &StoreDir) -> Result<StorePath, ParseDerivationError> {
        let s = self.string()?;
        parse_path(store_dir, &s)
    }

    fn list<T, F>(&mut self, mut item: F) -> Result<Vec<T>, ParseDerivationError>
    where
        F: FnMut(&mut Self) -> Result<T, ParseDerivationError>,
    {
        self.expect("[")?;
        let mut items = Vec::new();
        if self.eat("]") {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            if self.eat("]") {
                return Ok(items);
            }
            self.expect(",")?;
        }
    }
}
