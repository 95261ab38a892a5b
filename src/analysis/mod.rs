//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022 Evan Cox <evanacox00@gmail.com>. All rights reserved.      //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

//! Graph analyses over GIR procedures: control-flow graphs, dominator
//! information and dominance frontiers.
//!
//! All of these are computed views keyed by block index; they borrow
//! nothing from the procedure and stay valid until the block structure
//! changes.

mod dominators;
mod flowgraph;

pub use dominators::*;
pub use flowgraph::*;
