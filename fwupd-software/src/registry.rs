// Licensed under the Apache-2.0 license

//! `DeviceRegistry`: maps configured object path to the owned `Device`
//! (spec.md 3: "the UpdateManager aggregates Devices by object path").

use std::collections::HashMap;

use crate::device::Device;

pub struct DeviceRegistry<'a> {
    devices: HashMap<String, Device<'a>>,
}

impl<'a> Default for DeviceRegistry<'a> {
    fn default() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }
}

impl<'a> DeviceRegistry<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object_path: impl Into<String>, device: Device<'a>) {
        self.devices.insert(object_path.into(), device);
    }

    pub fn get(&self, object_path: &str) -> Option<&Device<'a>> {
        self.devices.get(object_path)
    }

    pub fn get_mut(&mut self, object_path: &str) -> Option<&mut Device<'a>> {
        self.devices.get_mut(object_path)
    }

    /// Finds the configured device whose `compatible_name` matches one of
    /// the manifest's `CompatibleName` entries, falling back to the single
    /// configured device when a domain has exactly one (most non-BMC
    /// domains configure a single target per purpose).
    pub fn find_target(&mut self, compatible_names: &[String]) -> Option<&mut Device<'a>> {
        if self.devices.len() == 1 {
            return self.devices.values_mut().next();
        }
        let object_path = self
            .devices
            .iter()
            .find(|(_, device)| compatible_names.contains(&device.config().compatible_name))
            .map(|(path, _)| path.clone())?;
        self.devices.get_mut(&object_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Device<'a>)> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Device<'a>)> {
        self.devices.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
