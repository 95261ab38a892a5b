//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

#![deny(
    unreachable_pub,
    missing_docs,
    missing_abi,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links
)]

//! # Garnet
//!
//! These are the basic APIs for building and transforming GIR, a
//! register-based three-address IR for procedures of a managed language.
//!
//! The centerpiece is [`transforms::SsaRewriter`], which rewrites a procedure
//! into SSA form: every redefinition of a variable gets a fresh name, every
//! use is rewired to its reaching definition, φ-functions are synthesized at
//! dominance frontiers, and try/catch joints are filled in with the versions
//! that can reach an exception handler.

pub mod analysis;
pub mod ir;
pub mod transforms;
pub mod utility;

pub use transforms::rewrite_to_ssa;
