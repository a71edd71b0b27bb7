//! 帧节流 + 单槽推理线程
//!
//! 主线程按固定间隔提交帧, 推理线程独占 `Detector`;
//! 帧通道容量为 0, 只有推理线程空闲 (阻塞在 recv) 时才能交接,
//! 推理进行中提交的帧直接丢弃, 不排队。结果按提交序号依次返回。
//! 已放置对象 (`TrackedObjectStore`) 留在调用线程, 保持单写者。

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};

use super::detector::Detector;
use super::types::Detection;
use crate::error::Result;
use crate::input::PlanarFrame;

/// 最小帧间隔节流
#[derive(Debug, Clone)]
pub struct FrameGate {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 距上次放行已超过间隔时放行并记录时间
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// 推理线程返回的单帧结果
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub sequence: u64,
    pub detections: Vec<Detection>,
    /// 引擎前向耗时 (备用检测器为 0)
    pub inference_ms: f64,
    /// 整帧耗时, 含颜色转换与 letterbox
    pub total_ms: f64,
}

pub struct InferenceWorker {
    tx_frame: Option<Sender<(u64, PlanarFrame)>>,
    rx_result: Receiver<FrameResult>,
    handle: Option<JoinHandle<()>>,
    model_loaded: bool,
    next_sequence: u64,
    dropped: u64,
}

impl InferenceWorker {
    /// 启动推理线程, `detector` 移交给该线程
    pub fn spawn(mut detector: Detector) -> Result<Self> {
        let (tx_frame, rx_frame) = bounded::<(u64, PlanarFrame)>(0);
        let (tx_result, rx_result) = unbounded();
        let model_loaded = detector.is_model_loaded();

        let handle = thread::Builder::new()
            .name("inference".to_string())
            .spawn(move || {
                log::info!("inference worker started");
                while let Ok((sequence, frame)) = rx_frame.recv() {
                    let t_start = Instant::now();
                    let detections = detector.detect(&frame);
                    let result = FrameResult {
                        sequence,
                        detections,
                        inference_ms: if detector.is_model_loaded() {
                            detector.inference_ms()
                        } else {
                            0.0
                        },
                        total_ms: t_start.elapsed().as_secs_f64() * 1000.0,
                    };
                    if tx_result.send(result).is_err() {
                        break;
                    }
                }
                log::info!("inference worker stopped");
            })?;

        Ok(Self {
            tx_frame: Some(tx_frame),
            rx_result,
            handle: Some(handle),
            model_loaded,
            next_sequence: 0,
            dropped: 0,
        })
    }

    /// 提交一帧; 推理线程忙时丢弃该帧并返回 None
    pub fn submit(&mut self, frame: PlanarFrame) -> Option<u64> {
        let tx = self.tx_frame.as_ref()?;
        let sequence = self.next_sequence;
        match tx.try_send((sequence, frame)) {
            Ok(()) => {
                self.next_sequence += 1;
                Some(sequence)
            }
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::trace!("worker busy, frame dropped ({} total)", self.dropped);
                None
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("inference worker is gone");
                None
            }
        }
    }

    /// 等待推理线程空闲后提交 (静态图片批处理), 超时视为丢弃
    pub fn submit_timeout(&mut self, frame: PlanarFrame, timeout: Duration) -> Option<u64> {
        let tx = self.tx_frame.as_ref()?;
        let sequence = self.next_sequence;
        match tx.send_timeout((sequence, frame), timeout) {
            Ok(()) => {
                self.next_sequence += 1;
                Some(sequence)
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.dropped += 1;
                None
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                log::warn!("inference worker is gone");
                None
            }
        }
    }

    /// 非阻塞取结果
    pub fn try_recv(&self) -> Option<FrameResult> {
        self.rx_result.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<FrameResult> {
        match self.rx_result.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model_loaded
    }

    /// 因推理线程忙而丢弃的帧数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 已接受的帧数
    pub fn submitted(&self) -> u64 {
        self.next_sequence
    }

    /// 关闭输入通道并等待线程退出
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.tx_frame.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("inference worker panicked");
            }
        }
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::input::ChromaKind;
    use crate::models::InferenceEngine;
    use crate::utils::letterbox::LetterboxTensor;
    use image::{Rgb, RgbImage};
    use ndarray::ArrayD;

    fn frame() -> PlanarFrame {
        PlanarFrame::from_rgb(&RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])), ChromaKind::I420)
    }

    const WAIT: Duration = Duration::from_secs(5);

    /// 推理开始时发出信号, 然后等待放行
    struct Blocking {
        started: Sender<()>,
        release: Receiver<()>,
    }

    impl InferenceEngine for Blocking {
        fn run(&mut self, _tensor: &LetterboxTensor) -> anyhow::Result<ArrayD<f32>> {
            self.started.send(())?;
            self.release.recv()?;
            Ok(ArrayD::zeros(ndarray::IxDyn(&[1, 4, 6])))
        }

        fn name(&self) -> &str {
            "blocking"
        }
    }

    #[test]
    fn gate_enforces_interval() {
        let mut gate = FrameGate::from_millis(500);
        let t0 = Instant::now();
        assert!(gate.ready_at(t0));
        assert!(!gate.ready_at(t0 + Duration::from_millis(499)));
        assert!(gate.ready_at(t0 + Duration::from_millis(500)));
        assert!(!gate.ready_at(t0 + Duration::from_millis(700)));
        assert!(gate.ready_at(t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn results_come_back_in_order() {
        let detector = Detector::new(DetectorConfig::default(), None);
        let mut worker = InferenceWorker::spawn(detector).unwrap();
        assert!(!worker.is_model_loaded());

        for expected in 0..5 {
            let seq = worker.submit_timeout(frame(), WAIT).unwrap();
            assert_eq!(seq, expected);
            let result = worker.recv_timeout(WAIT).unwrap();
            assert_eq!(result.sequence, seq);
            assert_eq!(result.detections.len(), 6);
            assert_eq!(result.inference_ms, 0.0);
            assert!(result.total_ms >= 0.0);
        }
        assert_eq!(worker.submitted(), 5);
        assert_eq!(worker.dropped(), 0);
        worker.shutdown();
    }

    #[test]
    fn frames_submitted_during_inference_are_dropped() {
        let (started_tx, started) = unbounded();
        let (release, release_rx) = unbounded();
        let engine = Blocking {
            started: started_tx,
            release: release_rx,
        };
        let detector = Detector::new(DetectorConfig::default(), Some(Box::new(engine)));
        let mut worker = InferenceWorker::spawn(detector).unwrap();

        assert_eq!(worker.submit_timeout(frame(), WAIT), Some(0));
        started.recv_timeout(WAIT).unwrap();

        // 推理进行中: 新帧不排队
        assert_eq!(worker.submit(frame()), None);
        assert_eq!(worker.submit(frame()), None);
        assert_eq!(worker.dropped(), 2);
        assert_eq!(worker.submitted(), 1);

        release.send(()).unwrap();
        let result = worker.recv_timeout(WAIT).unwrap();
        assert_eq!(result.sequence, 0);
        assert!(result.detections.is_empty());
        assert!(result.inference_ms > 0.0);
        assert!(result.total_ms >= result.inference_ms);

        // 空闲后下一帧拿到下一个序号, 之前丢弃的帧不会再被处理
        assert_eq!(worker.submit_timeout(frame(), WAIT), Some(1));
        started.recv_timeout(WAIT).unwrap();
        release.send(()).unwrap();
        assert_eq!(worker.recv_timeout(WAIT).unwrap().sequence, 1);
        assert!(worker.try_recv().is_none());

        drop(release);
        worker.shutdown();
    }
}
