//! Bench-style runs at default bus timing: 10 MHz system clock, 10 µs SCLK
//! period, 600 idle cycles after every frame.

use spi_pwm_core::peripherals::regs::{DUTY, ENABLE_A, ENABLE_B, PWM_MODE_A, PWM_MODE_B};
use spi_pwm_core::script::Script;
use spi_pwm_core::{measure_pwm, Peripheral, SpiDriver, CHANNEL_COUNT};

fn reset(p: &mut Peripheral) {
    p.set_rst_n(false);
    p.idle(5);
    p.set_rst_n(true);
    p.idle(5);
}

fn setup() -> (Peripheral, SpiDriver) {
    let mut p = Peripheral::new();
    reset(&mut p);
    (p, SpiDriver::default())
}

fn all_pwm(p: &mut Peripheral, drv: &SpiDriver, duty: u8) {
    for addr in [ENABLE_A, ENABLE_B, PWM_MODE_A, PWM_MODE_B] {
        drv.write(p, addr, 0xFF).unwrap();
    }
    drv.write(p, DUTY, duty).unwrap();
}

#[test]
fn test_enable_outputs_and_ignore_bad_frames() {
    let (mut p, drv) = setup();

    drv.write(&mut p, ENABLE_A, 0xF0).unwrap();
    assert_eq!(p.uo_out(), 0xF0);

    drv.write(&mut p, ENABLE_B, 0xCC).unwrap();
    assert_eq!(p.uio_out(), 0xCC);

    drv.write(&mut p, 0x30, 0xAA).unwrap();
    assert_eq!(p.uo_out(), 0xF0);
    assert_eq!(p.uio_out(), 0xCC);

    drv.read(&mut p, 0x30, 0xBE).unwrap();
    assert_eq!(p.uo_out(), 0xF0);
    drv.read(&mut p, 0x41, 0xEF).unwrap();
    assert_eq!(p.uo_out(), 0xF0);
    assert_eq!(p.regs.as_array(), [0xF0, 0xCC, 0, 0, 0]);
}

#[test]
fn test_pwm_frequency_every_channel() {
    let (mut p, drv) = setup();
    all_pwm(&mut p, &drv, 0x80);
    for ch in 0..CHANNEL_COUNT {
        let m = measure_pwm(&mut p, ch, 4);
        assert!(
            (2970.0..=3030.0).contains(&m.freq_hz),
            "channel {}: {:.1} Hz",
            ch,
            m.freq_hz
        );
    }
}

#[test]
fn test_duty_boundaries_every_channel() {
    let (mut p, drv) = setup();
    for (duty, expected) in [(0x00u8, 0.0), (0x80, 50.0), (0xFF, 100.0)] {
        all_pwm(&mut p, &drv, duty);
        for ch in 0..CHANNEL_COUNT {
            let m = measure_pwm(&mut p, ch, 2);
            assert!(
                (m.duty_percent - expected).abs() < 0.5,
                "duty 0x{:02X} channel {}: {:.2} %",
                duty,
                ch,
                m.duty_percent
            );
        }
    }
}

#[test]
fn test_disabled_channels_stay_low() {
    let (mut p, drv) = setup();
    drv.write(&mut p, PWM_MODE_A, 0xFF).unwrap();
    drv.write(&mut p, PWM_MODE_B, 0xFF).unwrap();
    drv.write(&mut p, DUTY, 0xFF).unwrap();
    drv.write(&mut p, ENABLE_A, 0x0F).unwrap();
    for _ in 0..3333 * 3 {
        p.idle(1);
        assert_eq!(p.outputs() & 0xFFF0, 0);
    }
}

#[test]
fn test_mixed_static_and_pwm_channels() {
    let (mut p, drv) = setup();
    drv.write(&mut p, ENABLE_A, 0xFF).unwrap();
    drv.write(&mut p, PWM_MODE_A, 0x0F).unwrap();
    drv.write(&mut p, DUTY, 0x40).unwrap();
    for _ in 0..3333 * 2 {
        p.idle(1);
        assert_eq!(p.uo_out() & 0xF0, 0xF0);
    }
    let m = measure_pwm(&mut p, 2, 2);
    assert!((m.duty_percent - 25.1).abs() < 0.5, "{:?}", m);
}

#[test]
fn test_repeated_write_is_idempotent() {
    let (mut p, drv) = setup();
    drv.write(&mut p, ENABLE_B, 0x5A).unwrap();
    let once = (p.regs.as_array(), p.outputs());
    drv.write(&mut p, ENABLE_B, 0x5A).unwrap();
    assert_eq!((p.regs.as_array(), p.outputs()), once);
}

#[test]
fn test_reserved_addresses_never_touch_registers() {
    let mut p = Peripheral::new();
    let drv = SpiDriver::new(spi_pwm_core::BusTiming { half_period: 3, setup: 1, trailing_idle: 8 });
    drv.write(&mut p, ENABLE_A, 0x81).unwrap();
    drv.write(&mut p, DUTY, 0x10).unwrap();
    let before = p.regs.as_array();
    for addr in 0x05..=0x7F {
        drv.write(&mut p, addr, 0xFF).unwrap();
    }
    assert_eq!(p.regs.as_array(), before);
    assert_eq!(p.regs.dbg_dropped, 0x7F - 0x05 + 1);
}

#[test]
fn test_bench_script() {
    let script = Script::parse(
        "reset\n\
         write 0x00 0xF0\n\
         expect uo 0xF0\n\
         write 0x01 0xCC\n\
         expect uio 0xCC\n\
         write 0x30 0xAA\n\
         expect uo 0xF0\n\
         read 0x30 0xBE\n\
         read 0x41 0xEF\n\
         expect uo 0xF0\n\
         # all channels PWM at 50 %\n\
         write 0x00 0xFF\n\
         write 0x01 0xFF\n\
         write 0x02 0xFF\n\
         write 0x03 0xFF\n\
         write 0x04 0x80\n\
         expect-freq 0 2970 3030\n\
         expect-freq 15 2970 3030\n\
         expect-duty 7 50 0.5\n\
         write 0x04 0x00\n\
         expect-duty 8 0 0.5\n\
         write 0x04 0xFF\n\
         expect-duty 8 100 0.5\n",
    )
    .unwrap();
    let mut p = Peripheral::new();
    let report = script.run(&mut p, &SpiDriver::default()).unwrap();
    assert_eq!(report.measurements.len(), 5);
    assert!(report.cycles > 10 * SpiDriver::default().frame_cycles());
}
