//! Binary output writers.

use std::io::{self, Write};

use crate::asm::{Asm, OutputFormat};

pub fn write_output(asm: &Asm, w: &mut impl Write) -> io::Result<()> {
    match asm.format {
        OutputFormat::Raw => write_raw(asm, w),
        OutputFormat::Decb => write_decb(asm, w),
        format => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{format} output is not supported"),
        )),
    }
}

/// Every emitted byte in line order, with no addressing information.
fn write_raw(asm: &Asm, w: &mut impl Write) -> io::Result<()> {
    for (_, line) in asm.lines.iter() {
        w.write_all(&line.output)?;
    }
    Ok(())
}

/// Disk BASIC loadable: preamble blocks of `00 len:16 addr:16 data`,
/// one per run of contiguous bytes, then `FF 00 00 exec:16`.
fn write_decb(asm: &Asm, w: &mut impl Write) -> io::Result<()> {
    let mut start: u16 = 0;
    let mut block: Vec<u8> = Vec::new();
    for (id, line) in asm.lines.iter() {
        if line.output.is_empty() {
            continue;
        }
        let addr = line.addr.as_int().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line {id} has no fixed address"),
            )
        })?;
        let end = i64::from(addr) + line.output.len() as i64;
        let addr = u16::try_from(addr)
            .ok()
            .filter(|_| end <= 0x10000)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {id} at {addr} does not fit in 16 bits"),
                )
            })?;
        let contiguous = start.wrapping_add(block.len() as u16) == addr;
        if !contiguous || block.len() + line.output.len() > 0xFFFF {
            write_decb_block(w, start, &block)?;
            block.clear();
            start = addr;
        }
        block.extend_from_slice(&line.output);
    }
    write_decb_block(w, start, &block)?;
    let exec = asm.execaddr.unwrap_or(0) as u16;
    w.write_all(&[0xFF, 0x00, 0x00])?;
    w.write_all(&exec.to_be_bytes())?;
    Ok(())
}

fn write_decb_block(w: &mut impl Write, addr: u16, data: &[u8]) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    w.write_all(&[0x00])?;
    w.write_all(&(data.len() as u16).to_be_bytes())?;
    w.write_all(&addr.to_be_bytes())?;
    w.write_all(data)
}
