//! Deterministic synthetic packets for test files and demos.

use crate::array_event::ArrayEvent;
use crate::array_trigger::ArrayTriggerRecord;
use crate::config::SyntheticRunConfig;
use crate::error::Result;
use crate::event::EventRecord;
use crate::packet::Packet;
use crate::simulation::{
    CorsikaSimulationData, PixelLocation, SimulationData, SimulationHeader, TelescopeLocation,
};

/// Build the packet for `index`: one fully hit event per configured
/// telescope, an array trigger and optionally the simulation banks. With
/// simulation banks on, packet 0 also carries the run's simulation header.
pub fn build_packet(config: &SyntheticRunConfig, index: u32) -> Result<Packet> {
    let mut ae = ArrayEvent::new();
    ae.set_run_number(config.run_number);

    for &node in &config.telescopes {
        ae.add_event(build_event(config, index, node)?)?;
    }

    let mut at = ArrayTriggerRecord::with_sizes(config.subarray_telescopes, config.trigger_telescopes);
    at.set_event_number(index);
    at.set_run_number(config.run_number);
    for slot in 0..config.subarray_telescopes {
        at.set_subarray_telescope_id(slot, slot as u32)?;
    }
    for (slot, &node) in config
        .telescopes
        .iter()
        .enumerate()
        .take(config.trigger_telescopes)
    {
        at.set_trigger_telescope_id(slot, u32::from(node))?;
    }
    ae.set_trigger(at);

    let mut packet = Packet::new();
    packet.put_array_event(ae);
    if config.simulation_banks {
        packet.put_simulation_data(SimulationData::default());
        let n = index as f32 + 1.0;
        packet.put_corsika_simulation_data(CorsikaSimulationData {
            first_interaction_height: 10.0e3 + 100.0 * n,
            first_interaction_depth: 50.0 - 0.1 * n,
            corsika_run_id: ((index + 1) / 10) as i32,
            shower_id: (index + 1) as i32,
        });
        if index == 0 {
            packet.put_simulation_header(simulation_header(config));
        }
    }
    Ok(packet)
}

fn simulation_header(config: &SyntheticRunConfig) -> SimulationHeader {
    let camera = (0..config.num_channels)
        .map(|ch| PixelLocation {
            east_at_stow_deg: 0.15 * (ch % 23) as f32,
            up_at_stow_deg: 0.15 * (ch / 23) as f32,
            radius_deg: 0.075,
        })
        .collect::<Vec<_>>();
    let array = config
        .telescopes
        .iter()
        .map(|&node| TelescopeLocation {
            rel_south_m: 40.0 * f32::from(node),
            rel_east_m: -20.0 * f32::from(node),
            rel_up_m: 0.0,
            camera: camera.clone(),
        })
        .collect();
    SimulationHeader {
        simulation_package: SimulationHeader::PACKAGE_UNKNOWN,
        simulator: "bankfile synthetic".into(),
        array,
        sim_config_file: format!(
            "run {} packets {} samples {}",
            config.run_number, config.num_packets, config.num_samples
        ),
        ..SimulationHeader::default()
    }
}

fn build_event(config: &SyntheticRunConfig, index: u32, node: u8) -> Result<EventRecord> {
    let mut ev = EventRecord::with_sizes(
        config.num_samples,
        config.num_channels,
        config.num_channels,
        config.clock_trig_boards,
    );
    ev.set_event_number(index);
    ev.set_node_number(node);
    ev.set_compressed(config.compress);
    for ch in 0..config.num_channels {
        ev.set_hit_bit(ch, true)?;
    }
    let base = (index % 2) as u8;
    for ch in 0..ev.num_channels() {
        let samples = ev.samples_mut(ch)?;
        samples.fill(base);
        // Two channels carry a pulse so the waveforms are not uniform.
        if ch == 3 || ch == 6 {
            for s in samples.iter_mut().skip(7) {
                *s = 10;
            }
        }
    }
    Ok(ev)
}
