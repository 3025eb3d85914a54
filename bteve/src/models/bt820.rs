use super::Model;
use crate::memory;

/// Device type representing the BT820 and its close relatives.
///
/// This type is used only at compile time as a type parameter, or as an
/// empty (compile-time-only) argument in order to influence selection of
/// a type parameter on a function call that wouldn't naturally imply one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BT820;

impl Model for BT820 {
    type MainMem = MainMem;
    type DisplayListMem = DisplayListMem;
    type RegisterMem = RegisterMem;
    type SystemRegisterMem = SystemRegisterMem;
    type CommandMem = CommandMem;
    type CommandAppendMem = CommandAppendMem;
    type ErrReportMem = ErrReportMem;

    const CHIP_ID: u32 = 0x50820;
}

// Everything but main memory lives in the high window at 0x7f000000.
const BASE: u32 = 0x7f000000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MainMem {}
impl memory::MemoryRegion for MainMem {
    type Model = BT820;
    const BASE_ADDR: u32 = 0x00000000;
    const LENGTH: u32 = 1024 * 1024 * 1024;
    const DEBUG_NAME: &'static str = "MainMem";
}
impl memory::HostAccessible for MainMem {}
impl memory::MainMem for MainMem {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandMem {}
impl memory::MemoryRegion for CommandMem {
    type Model = BT820;
    const BASE_ADDR: u32 = BASE;
    const LENGTH: u32 = 16 * 1024;
    const DEBUG_NAME: &'static str = "CommandMem";
}
impl memory::HostAccessible for CommandMem {}
impl memory::CommandMem for CommandMem {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterMem {}
impl memory::MemoryRegion for RegisterMem {
    type Model = BT820;
    const BASE_ADDR: u32 = BASE + 0x6000;
    const LENGTH: u32 = 4 * 1024;
    const DEBUG_NAME: &'static str = "RegisterMem";
}
impl memory::HostAccessible for RegisterMem {}
impl memory::RegisterMem for RegisterMem {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisplayListMem {}
impl memory::MemoryRegion for DisplayListMem {
    type Model = BT820;
    const BASE_ADDR: u32 = BASE + 0x8000;
    const LENGTH: u32 = 16 * 1024;
    const DEBUG_NAME: &'static str = "DisplayListMem";
}
impl memory::HostAccessible for DisplayListMem {}
impl memory::DisplayListMem for DisplayListMem {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandAppendMem {}
impl memory::MemoryRegion for CommandAppendMem {
    type Model = BT820;
    const BASE_ADDR: u32 = BASE + 0x10000;
    const LENGTH: u32 = 4;
    const DEBUG_NAME: &'static str = "CommandAppendMem";
}
impl memory::HostAccessible for CommandAppendMem {}
impl memory::CommandAppendMem for CommandAppendMem {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SystemRegisterMem {}
impl memory::MemoryRegion for SystemRegisterMem {
    type Model = BT820;
    const BASE_ADDR: u32 = 0x7f800000;
    const LENGTH: u32 = 4 * 1024;
    const DEBUG_NAME: &'static str = "SystemRegisterMem";
}
impl memory::HostAccessible for SystemRegisterMem {}
impl memory::SystemRegisterMem for SystemRegisterMem {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrReportMem {}
impl memory::MemoryRegion for ErrReportMem {
    type Model = BT820;
    const BASE_ADDR: u32 = 0x309800;
    const LENGTH: u32 = 128;
    const DEBUG_NAME: &'static str = "ErrReportMem";
}
impl memory::HostAccessible for ErrReportMem {}
impl memory::ErrReportMem for ErrReportMem {
    type RawMessage = [u8; 128];
}
