//! 分发指标收集模块
//!
//! 记录 fan-out 各阶段的 Prometheus 指标，并在内存中聚合运行统计。

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// 记录一个事件批次进入 fan-out
pub fn record_batch_received(stream: &str, size: usize) {
    counter!("event_fanout_batches_total", "stream" => stream.to_string()).increment(1);
    counter!("event_fanout_events_total", "stream" => stream.to_string()).increment(size as u64);
    histogram!("event_fanout_batch_size", "stream" => stream.to_string()).record(size as f64);
}

/// 记录发送任务入队
pub fn record_job_submitted(transport: &str) {
    counter!(
        "event_fanout_jobs_submitted_total",
        "transport" => transport.to_string()
    )
    .increment(1);
}

/// 记录发送任务被拒绝 (队列满、路由失败等)
pub fn record_job_rejected(transport: &str, reason: &str) {
    counter!(
        "event_fanout_jobs_rejected_total",
        "transport" => transport.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录发送结果 (`success` 或错误类型)
pub fn record_send_result(transport: &str, outcome: &str) {
    counter!(
        "event_fanout_sends_total",
        "transport" => transport.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录队列深度
pub fn record_queue_depth(pool: &str, depth: usize) {
    gauge!("event_fanout_queue_depth", "pool" => pool.to_string()).set(depth as f64);
}

/// 记录存活 worker 数
pub fn record_pool_workers(pool: &str, live: usize) {
    gauge!("event_fanout_pool_workers", "pool" => pool.to_string()).set(live as f64);
}

/// 单个 transport 的累计结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportTotals {
    /// 入队成功
    pub submitted: u64,
    /// 发送成功
    pub sent: u64,
    /// 发送失败 (连接不可用 / 被拒绝)
    pub send_errors: u64,
    /// 未能入队 (队列满 / 路由失败 / 队列已关闭)
    pub rejected: u64,
}

impl TransportTotals {
    /// 成功率 (%)，相对于收到的事件总数
    pub fn delivery_rate(&self) -> f64 {
        let offered = self.submitted + self.rejected;
        if offered == 0 {
            0.0
        } else {
            self.sent as f64 / offered as f64 * 100.0
        }
    }
}

/// 分发统计聚合器
///
/// 在内存中聚合批次与 transport 结果，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DispatchStatsAggregator {
    /// 总批次数
    pub total_batches: u64,

    /// 总事件数
    pub total_events: u64,

    /// 批次大小统计
    pub batch_size_stats: RunningStats,

    /// `receive` 耗时统计 (微秒)
    pub receive_latency_stats: RunningStats,

    /// 各 transport 累计结果
    pub transports: BTreeMap<String, TransportTotals>,
}

impl DispatchStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个批次
    pub fn record_batch(&mut self, size: usize, receive_latency_us: f64) {
        self.total_batches += 1;
        self.total_events += size as u64;
        self.batch_size_stats.push(size as f64);
        self.receive_latency_stats.push(receive_latency_us);
    }

    /// 更新某个 transport 的累计结果 (覆盖旧值)
    pub fn set_transport(&mut self, name: &str, totals: TransportTotals) {
        self.transports.insert(name.to_string(), totals);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> DispatchSummary {
        DispatchSummary {
            total_batches: self.total_batches,
            total_events: self.total_events,
            batch_size: StatsSummary::from(&self.batch_size_stats),
            receive_latency_us: StatsSummary::from(&self.receive_latency_stats),
            transports: self.transports.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 分发摘要
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub total_batches: u64,
    pub total_events: u64,
    pub batch_size: StatsSummary,
    pub receive_latency_us: StatsSummary,
    pub transports: BTreeMap<String, TransportTotals>,
}

impl std::fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Dispatch Summary ===")?;
        writeln!(f, "Batches: {}", self.total_batches)?;
        writeln!(f, "Events: {}", self.total_events)?;
        writeln!(f, "Batch size: {}", self.batch_size)?;
        writeln!(f, "Receive latency (us): {}", self.receive_latency_us)?;

        if !self.transports.is_empty() {
            writeln!(f, "Transports:")?;
            for (name, t) in &self.transports {
                writeln!(
                    f,
                    "  {}: submitted={}, sent={}, send_errors={}, rejected={} ({:.2}% delivered)",
                    name,
                    t.submitted,
                    t.sent,
                    t.send_errors,
                    t.rejected,
                    t.delivery_rate()
                )?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
