// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! wiremesh-core: the logic that sits between an editor and a mesh snapshot.
//!
//! - [`allocate`] picks the next free peer address.
//! - [`validate`] checks edited field values and whole snapshots.
//! - [`render`] turns a snapshot into a wg-quick config for one peer.
//! - [`change`] accumulates pending edits into a patch.
//!
//! Everything here is synchronous and pure over a borrowed
//! [`wiremesh_types::Network`].

pub mod allocate;
pub mod change;
pub mod render;
pub mod validate;

pub use allocate::{next_available_address, next_available_address_at};
pub use change::{ChangeSet, FieldState, Palette, Tone, apply_edit};
pub use render::{
    RenderError, RenderOptions, config_file_name, render_peer_config, render_peer_config_with,
};
pub use validate::{
    CheckResult, Field, IntegrityError, ValidationContext, ValidationError, check_field,
    check_network, validate,
};
