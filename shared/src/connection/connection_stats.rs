/// Connection statistics, refreshed every `stat_period` seconds.
#[derive(Clone, Debug, Default)]
pub struct ConnectionStats {
    /// Average round trip of acknowledged packets over the last period.
    pub avg_lag: f64,
    pub best_lag: f64,
    pub in_bytes_per_second: u32,
    pub out_bytes_per_second: u32,
    pub in_packets_per_second: u32,
    pub out_packets_per_second: u32,
    /// Packets the peer never delivered (gaps in its acks).
    pub out_packets_lost: u32,
    /// Gaps in the received packet ids.
    pub in_packets_lost: u32,
    /// Received packets that were older than the newest one.
    pub in_packets_out_of_order: u32,
    /// How far our outgoing rate exceeds what the peer reports receiving,
    /// as a percentage.
    pub remote_saturation: f32,

    lag_acc: f64,
    lag_count: u32,
    in_bytes: u32,
    out_bytes: u32,
    in_packets: u32,
    out_packets: u32,
    stat_update_time: f64,
}

impl ConnectionStats {
    pub(crate) fn new(time: f64) -> Self {
        Self {
            stat_update_time: time,
            ..Default::default()
        }
    }

    pub(crate) fn record_received(&mut self, num_bytes: u32) {
        self.in_bytes = self.in_bytes.saturating_add(num_bytes);
        self.in_packets += 1;
    }

    pub(crate) fn record_sent(&mut self, num_bytes: u32) {
        self.out_bytes = self.out_bytes.saturating_add(num_bytes);
        self.out_packets += 1;
    }

    pub(crate) fn record_lag(&mut self, lag: f64) {
        self.lag_acc += lag;
        self.lag_count += 1;
    }

    pub(crate) fn record_remote_saturation(&mut self, remote_in_kbytes: u32, out_kbytes: u32) {
        if out_kbytes > 0 {
            let ratio = (remote_in_kbytes as f32 / out_kbytes as f32).min(1.0);
            self.remote_saturation = (1.0 - ratio) * 100.0;
        }
    }

    /// Folds the accumulators into per-second figures once a period elapsed.
    pub(crate) fn update(&mut self, time: f64, stat_period: f64) {
        let elapsed = time - self.stat_update_time;
        if elapsed <= stat_period || elapsed <= 0.0 {
            return;
        }
        self.in_bytes_per_second = (self.in_bytes as f64 / elapsed) as u32;
        self.out_bytes_per_second = (self.out_bytes as f64 / elapsed) as u32;
        self.in_packets_per_second = (self.in_packets as f64 / elapsed) as u32;
        self.out_packets_per_second = (self.out_packets as f64 / elapsed) as u32;
        if self.lag_count > 0 {
            self.avg_lag = self.lag_acc / self.lag_count as f64;
            self.best_lag = self.avg_lag;
        }

        self.lag_acc = 0.0;
        self.lag_count = 0;
        self.in_bytes = 0;
        self.out_bytes = 0;
        self.in_packets = 0;
        self.out_packets = 0;
        self.stat_update_time = time;
    }
}
