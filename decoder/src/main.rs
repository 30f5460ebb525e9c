#![no_std]
#![no_main]

//! Firmware entry point: board bring-up, then the host command loop.
//!
//! The register-level MAX78000 flash controller, UART and TRNG peripherals
//! this would normally drive are not available in this tree (see
//! `max78000_hal`'s crate doc), so boot here wires [`DecoderContext`] to the
//! same simulated backends the unit tests use. Swapping in real hardware is
//! a matter of providing [`NvmPage`]/[`SerialPort`]/[`TrueRandom`]
//! implementations over the actual FLC/UART/TRNG registers; nothing above
//! the HAL traits would need to change.

use core::panic::PanicInfo;
use core::time::Duration;

use cortex_m_rt::entry;

use decoder::context::{DecoderContext, Provisioning};
use decoder::decode;
use decoder::ectf_params;
use decoder::message::{HostChannel, Opcode};
use decoder::subscribe::{self, SubscriptionUpdate};

use max78000_hal::flash::SimPage;
use max78000_hal::timer::{sleep, SpinDelay, TickClock};
use max78000_hal::trng::SimTrng;
use max78000_hal::uart::{LoopbackPort, Uart};

static CLOCK: TickClock = TickClock::new();

fn provisioning() -> Provisioning {
    Provisioning {
        decoder_id: ectf_params::DECODER_ID,
        id_key: ectf_params::ID_KEY,
        encoder_public_key: ectf_params::ENCODER_PUBLIC_KEY,
        left_tree_key: ectf_params::LEFT_TREE_KEY,
        right_tree_key: ectf_params::RIGHT_TREE_KEY,
        channel0_root_key: ectf_params::CHANNEL0_ROOT_KEY,
        channel0_kch: ectf_params::CHANNEL0_KCH,
    }
}

/// Builds the `n_channels: u32` + up to [`MAX_CHANNEL_COUNT`] - 1 channel
/// records response body for `list_subscriptions`'s host-side counterpart.
fn list_channels_body<P: max78000_hal::flash::NvmPage>(ctx: &DecoderContext<P>, out: &mut [u8]) -> usize {
    let channels = ctx.subscriptions.list();
    out[..4].copy_from_slice(&(channels.len() as u32).to_le_bytes());

    let mut offset = 4;
    for info in channels.iter() {
        out[offset..offset + 4].copy_from_slice(&info.channel.to_le_bytes());
        out[offset + 4..offset + 12].copy_from_slice(&info.start.to_le_bytes());
        out[offset + 12..offset + 20].copy_from_slice(&info.end.to_le_bytes());
        offset += 20;
    }
    offset
}

#[entry]
fn main() -> ! {
    // the original firmware's 1-second host power-up window.
    sleep(&CLOCK, Duration::from_millis(900));

    let mut ctx = DecoderContext::boot(
        core::array::from_fn(|_| SimPage::erased()),
        SimPage::erased(),
        provisioning(),
    );

    let mut delay = SpinDelay::new(&CLOCK);
    ctx.lockout.run(&mut delay);

    let mut trng = SimTrng::new(0x5eed);
    let mut channel = HostChannel::new(Uart::new(LoopbackPort::<4096>::with_input(&[])));

    let mut buf = [0u8; decoder::message::MAX_BODY_SIZE];
    loop {
        ctx.entropy.refill_from(&mut trng);
        design_utils::entropy::fi_ranged_delay(&mut trng);

        let message = match channel.receive(&mut buf) {
            Ok(message) => message,
            Err(_) => continue,
        };

        match message.opcode {
            Opcode::List => {
                let mut response = [0u8; decoder::message::MAX_BODY_SIZE];
                let len = list_channels_body(&ctx, &mut response);
                let _ = channel.send(Opcode::List, &response[..len]);
            }
            Opcode::Decode => {
                let Some(packet) = bytemuck::try_from_bytes::<decoder::decode::FramePacket>(message.body).ok() else {
                    channel.send_error(b"malformed decode packet");
                    continue;
                };
                match decode::decode(&mut ctx, &mut trng, &mut delay, packet) {
                    Ok(frame) => {
                        let _ = channel.send(Opcode::Decode, &bytemuck::bytes_of(&frame)[..4 + frame.length as usize]);
                    }
                    Err(_outcome) => channel.send_error(b"decode failed"),
                }
            }
            Opcode::Subscribe => {
                let Some(update) = bytemuck::try_from_bytes::<SubscriptionUpdate>(message.body).ok() else {
                    channel.send_error(b"malformed subscription update");
                    continue;
                };
                match subscribe::subscribe(&mut ctx, &mut delay, update) {
                    Ok(()) => {
                        let _ = channel.send(Opcode::Subscribe, &[]);
                    }
                    Err(_outcome) => channel.send_error(b"subscription update rejected"),
                }
            }
            Opcode::Ack | Opcode::Error | Opcode::Debug => {}
        }
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {
        cortex_m::asm::nop();
    }
}
