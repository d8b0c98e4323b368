use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use chip8emu::emu::Trace;

/// Disassemble a CHIP-8 ROM to stdout, one instruction word per line.
///
/// Addresses start at 0x200, where ROMs are loaded by convention.
#[derive(Parser)]
struct Args {
    /// Path to the ROM file to disassemble
    rom_path: PathBuf,
}

const ROM_START_ADDRESS: u16 = 0x200;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    for (index, pair) in rom.chunks(2).enumerate() {
        let address = ROM_START_ADDRESS + index as u16 * 2;
        // A trailing odd byte can't form an instruction word; pad it so it
        // still shows up in the listing.
        let bytes = [pair[0], pair.get(1).copied().unwrap_or(0)];

        println!("{}", Trace::disassemble(address, bytes));
    }

    Ok(())
}
