cfg_if! {
    if #[cfg(feature = "net_test")]
    {
        use std::collections::VecDeque;

        use log::trace;

        use super::{connection_config::PacketSimulationSettings, transport::PacketSender};

        struct DelayedPacket {
            data: Vec<u8>,
            num_bits: u32,
            send_time: f64,
        }

        /// Applies artificial loss, duplication, reordering and lag to
        /// outgoing packets before they reach the transport.
        pub struct PacketSimulator {
            settings: PacketSimulationSettings,
            rng: fastrand::Rng,
            delayed: VecDeque<DelayedPacket>,
        }

        impl PacketSimulator {
            pub fn new(settings: PacketSimulationSettings, seed: Option<u64>) -> Self {
                let rng = match seed {
                    Some(seed) => fastrand::Rng::with_seed(seed),
                    None => fastrand::Rng::new(),
                };
                Self {
                    settings,
                    rng,
                    delayed: VecDeque::new(),
                }
            }

            pub fn settings(&self) -> &PacketSimulationSettings {
                &self.settings
            }

            pub fn set_settings(&mut self, settings: PacketSimulationSettings) {
                self.settings = settings;
            }

            pub fn num_delayed(&self) -> usize {
                self.delayed.len()
            }

            fn passes_loss(&mut self) -> bool {
                self.settings.pkt_loss == 0 || self.rng.f32() * 100.0 >= self.settings.pkt_loss as f32
            }

            /// Hands a finished packet to `sender`, or holds it back, as the
            /// simulation settings direct. `bypass` sends it untouched.
            pub fn dispatch(
                &mut self,
                time: f64,
                data: &[u8],
                num_bits: u32,
                sender: &mut dyn PacketSender,
                bypass: bool,
            ) {
                if bypass || !self.settings.is_active() {
                    sender.send(data, num_bits);
                    return;
                }

                if self.settings.pkt_order {
                    self.delayed.push_back(DelayedPacket {
                        data: data.to_vec(),
                        num_bits,
                        send_time: 0.0,
                    });
                    for index in (0..self.delayed.len()).rev() {
                        if self.rng.f32() > 0.5 {
                            let passes = self.passes_loss();
                            if let Some(packet) = self.delayed.remove(index) {
                                if passes {
                                    sender.send(&packet.data, packet.num_bits);
                                } else {
                                    trace!("simulated loss of a reordered packet");
                                }
                            }
                        }
                    }
                } else if self.settings.pkt_lag > 0 {
                    if self.passes_loss() {
                        let variance = 2.0 * (self.rng.f64() - 0.5) * self.settings.pkt_lag_variance as f64;
                        let lag_ms = (self.settings.pkt_lag as f64 + variance).max(0.0);
                        self.delayed.push_back(DelayedPacket {
                            data: data.to_vec(),
                            num_bits,
                            send_time: time + lag_ms / 1000.0,
                        });
                    }
                } else if self.passes_loss() {
                    sender.send(data, num_bits);
                    if self.settings.pkt_dup > 0 && self.rng.f32() * 100.0 < self.settings.pkt_dup as f32 {
                        sender.send(data, num_bits);
                    }
                } else {
                    trace!("simulated loss of a {} bit packet", num_bits);
                }
            }

            /// Sends held packets that are due, oldest first, stopping at the
            /// first one that is not.
            pub fn send_due(&mut self, time: f64, sender: &mut dyn PacketSender) {
                while let Some(packet) = self.delayed.front() {
                    if time <= packet.send_time {
                        break;
                    }
                    if let Some(packet) = self.delayed.pop_front() {
                        sender.send(&packet.data, packet.num_bits);
                    }
                }
            }
        }

    }
    else
    {
        use super::{connection_config::PacketSimulationSettings, transport::PacketSender};

        pub struct PacketSimulator {
            settings: PacketSimulationSettings,
        }

        impl PacketSimulator {
            pub fn new(settings: PacketSimulationSettings, _seed: Option<u64>) -> Self {
                Self { settings }
            }

            pub fn settings(&self) -> &PacketSimulationSettings {
                &self.settings
            }

            pub fn set_settings(&mut self, settings: PacketSimulationSettings) {
                self.settings = settings;
            }

            pub fn num_delayed(&self) -> usize {
                0
            }

            pub fn dispatch(
                &mut self,
                _time: f64,
                data: &[u8],
                num_bits: u32,
                sender: &mut dyn PacketSender,
                _bypass: bool,
            ) {
                sender.send(data, num_bits);
            }

            pub fn send_due(&mut self, _time: f64, _sender: &mut dyn PacketSender) {}
        }
    }
}
