// SPDX-FileCopyrightText: 2024 griff
//
// SPDX-License-Identifier: EUPL-1.2 or MIT

//! Identity core for Nix derivations: the derivation model, its canonical
//! text, string contexts and the hash-modulo computation that turns a
//! derivation graph into stable store paths.

extern crate self as nixrs_derivation;

pub mod base32;
pub mod context;
pub mod derivation;
pub mod derived_path;
pub mod experimental;
pub mod hash;
pub mod io;
pub mod store;
pub mod store_path;

#[cfg(any(test, feature = "test"))]
pub mod test;
