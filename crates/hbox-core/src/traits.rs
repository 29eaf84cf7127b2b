// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Seams between the authentication layer and the durable stores.

use crate::types::Device;

/// Read access to the set of registered devices.
///
/// The authenticator only needs lookups; the registry crate provides the
/// durable implementation.
pub trait DeviceDirectory: Send + Sync {
    /// Find a device by its exact (canonical uppercase) id.
    fn find_device(&self, device_id: &str) -> Option<Device>;
}

impl<D: DeviceDirectory + ?Sized> DeviceDirectory for std::sync::Arc<D> {
    fn find_device(&self, device_id: &str) -> Option<Device> {
        (**self).find_device(device_id)
    }
}

impl<D: DeviceDirectory + ?Sized> DeviceDirectory for &D {
    fn find_device(&self, device_id: &str) -> Option<Device> {
        (**self).find_device(device_id)
    }
}
