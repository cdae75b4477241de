#![no_std]
#![no_main]

use panic_halt as _;

use vapecore::board::avr::AvrBoard;
use vapecore::Controller;

/// Entry point: wire the concrete ATmega328P board to the control loop and
/// run the super-loop named in spec.md §4.G. There is no RTOS and no async
/// executor here — `TIMER1_COMPA` (millisecond tick) and `PCINT2` (wake on
/// fire-button edge) are the only interrupts in the system, both defined in
/// `board::avr`; everything else runs on this one thread of control.
#[avr_device::entry]
fn main() -> ! {
    let mut board = AvrBoard::take();

    let mut controller = match Controller::boot(&mut board) {
        Ok(controller) => controller,
        // `AvrBoard::Error` is `Infallible`; this arm exists only to satisfy
        // `Controller::boot`'s generic `Result` return and can never run.
        Err(_) => loop {},
    };

    loop {
        board.tick_buttons();
        let _ = controller.tick(&mut board);
    }
}
