// Copyright (c) 2025 Kassenbuch contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod accounts;
pub mod categories;
pub mod transactions;
pub mod importer;
pub mod exporter;
pub mod reports;
pub mod backup;
pub mod sync;
pub mod rules;
pub mod doctor;
