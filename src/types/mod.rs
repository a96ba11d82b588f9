//! Fixed-size values shared by the VM and its context.

pub mod hash;
