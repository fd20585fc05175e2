#![allow(dead_code)]

pub mod frames;
pub mod virtual_network;
