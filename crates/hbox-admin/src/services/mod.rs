// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Service layer — wires configuration, the two registries, the authenticator
// and the audit trail together for the command-line front end.

pub mod data_dir;
pub mod registry_services;
