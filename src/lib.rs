//! tbkit - TatungBytes Toolkit
//!
//! Tatung Einstein 向け開発補助:
//! - Z80 .asm → CP/M .COM（z80asm）
//! - .COM → Einstein .DSK（z88dk-appmake +cpmdisk）
//! - MAME で起動（DOS80経由 / Boot Direct）

pub mod error;
pub mod config;
pub mod project;
pub mod normalize;
pub mod disk;
pub mod build_log;
pub mod job;
pub mod toolchain;
pub mod emulator;
