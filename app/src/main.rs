#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use hal::{clocks::Clocks, pac};

use quaddec_algo::{
    EdgeDecoder, OutputQueue, SpeedEstimator, VelocitySampler, FIFO_DEPTH, ROVER_MK2,
};

/// Pin polling rate in Hz. Must stay well above the fastest edge rate (about 22 kHz).
const POLL_FREQ: u32 = 100_000;

#[rtic::app(device = pac, peripherals = true)]
mod app {
    use super::*;

    use heapless::spsc::Queue;
    use quaddec_drivers::{
        quad_pins::QuadPins,
        timer::{PollTimer, SampleTimer},
    };

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        poll_timer: PollTimer,
        sample_timer: SampleTimer,
        left_pins: QuadPins,
        right_pins: QuadPins,
        left_decoder: EdgeDecoder<'static, FIFO_DEPTH>,
        right_decoder: EdgeDecoder<'static, FIFO_DEPTH>,
        sampler: VelocitySampler<'static, FIFO_DEPTH>,
        left_speed: SpeedEstimator,
        right_speed: SpeedEstimator,
    }

    #[init(local = [
        left_queue: OutputQueue<FIFO_DEPTH> = Queue::new(),
        right_queue: OutputQueue<FIFO_DEPTH> = Queue::new(),
    ])]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let dp = ctx.device;
        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let sysclk_freq = clock_cfg.sysclk(); // System clock frequency in Hz
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", sysclk_freq / 1000000);

        let config = ROVER_MK2;
        config.validate().unwrap();
        defmt::info!(
            "ENCODER: {} counts/rev, sampling every {} ms, polling at {} Hz",
            config.counts_per_rev(),
            config.sample_period_ms,
            POLL_FREQ
        );

        // Each queue: decoder interrupt pushes, sampler interrupt pops
        let (left_tx, left_rx) = ctx.local.left_queue.split();
        let (right_tx, right_rx) = ctx.local.right_queue.split();

        let left_pins = QuadPins::left();
        let right_pins = QuadPins::right();

        let sample_timer = SampleTimer::new(dp.TIM3, &clock_cfg, config.sample_rate_hz());
        let poll_timer = PollTimer::new(dp.TIM2, &clock_cfg, POLL_FREQ);

        (
            Shared {},
            Local {
                poll_timer,
                sample_timer,
                left_pins,
                right_pins,
                left_decoder: EdgeDecoder::new(left_tx),
                right_decoder: EdgeDecoder::new(right_tx),
                sampler: VelocitySampler::new(left_rx, right_rx),
                left_speed: SpeedEstimator::new(&config),
                right_speed: SpeedEstimator::new(&config),
            },
        )
    }

    // Edge decoding for both encoders. Runs above the sampler so it is never held off by it.
    #[task(binds = TIM2, local = [poll_timer, left_pins, right_pins, left_decoder, right_decoder], priority = 2)]
    fn poll_encoders(cx: poll_encoders::Context) {
        cx.local.poll_timer.clear();

        cx.local.left_decoder.poll(cx.local.left_pins);
        cx.local.right_decoder.poll(cx.local.right_pins);
    }

    // Velocity sampling. The sampler is local to this task, so calls never overlap.
    #[task(binds = TIM3, local = [sample_timer, sampler, left_speed, right_speed], priority = 1)]
    fn sample_velocity(cx: sample_velocity::Context) {
        cx.local.sample_timer.clear();

        let (left, right) = cx.local.sampler.sample();

        let left_mrpm = cx.local.left_speed.tick(left).rpm_milli();
        let right_mrpm = cx.local.right_speed.tick(right).rpm_milli();

        defmt::debug!(
            "VELOCITY: delta L {} R {}, speed L {} R {} mrpm",
            left,
            right,
            left_mrpm,
            right_mrpm
        );
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
