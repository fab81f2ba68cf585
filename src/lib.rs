/*
 * Copyright Cedar Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Implementation of the Cedar evaluation and authorization engine in Rust.
//!
//! This crate is the engine core only: it consumes an already-constructed
//! policy AST and an in-memory entity store, and produces authorization
//! decisions with diagnostics. Parsing Cedar source text, loading entity
//! JSON, and schema validation are the business of upstream crates.
#![forbid(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod ast;
pub mod authorizer;
pub mod batch;
pub mod entities;
pub mod evaluator;
pub mod extensions;
