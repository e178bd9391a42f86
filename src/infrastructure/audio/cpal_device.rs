//! Cpal Audio Device - 系统默认输出设备
//!
//! 输出回调从 VirtualTimeline 混音，设备时钟即已输出的帧数。
//! `cpal::Stream` 在部分平台不是 `Send`，因此由专用线程持有，
//! 播放/暂停经命令通道转发。音源结束回调交给 tokio 任务执行，不占用音频线程。

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use parking_lot::Mutex;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::timeline::{EndedSource, VirtualTimeline};
use crate::application::ports::{
    AudioDeviceError, AudioDevicePort, DeviceState, EndedCallback, SourceId, SourceSpec,
};

type Reply = oneshot::Sender<Result<(), String>>;

enum StreamCommand {
    Play(Reply),
    Pause(Reply),
    Shutdown,
}

/// 输出流格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

pub struct CpalAudioDevice {
    timeline: Arc<VirtualTimeline>,
    commands: Mutex<std_mpsc::Sender<StreamCommand>>,
    audio_thread: Option<thread::JoinHandle<()>>,
    dispatcher: JoinHandle<()>,
    format: OutputFormat,
}

impl CpalAudioDevice {
    /// 打开系统默认输出设备
    ///
    /// 需要在 tokio runtime 内调用；没有可用设备时返回 `Unavailable`
    pub fn open() -> Result<Self, AudioDeviceError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AudioDeviceError::Unavailable(format!("no tokio runtime: {}", e)))?;

        let timeline = Arc::new(VirtualTimeline::new());
        let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<EndedSource>();
        let (command_tx, command_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let stream_timeline = timeline.clone();
        let audio_thread = thread::Builder::new()
            .name("speakline-audio".to_string())
            .spawn(move || run_stream(stream_timeline, ended_tx, command_rx, ready_tx))
            .map_err(|e| AudioDeviceError::Unavailable(format!("cannot spawn audio thread: {}", e)))?;

        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = audio_thread.join();
                return Err(AudioDeviceError::Unavailable(e));
            }
            Err(_) => {
                return Err(AudioDeviceError::Unavailable(
                    "audio thread exited during startup".to_string(),
                ))
            }
        };

        let dispatcher = runtime.spawn(async move {
            while let Some((id, on_ended)) = ended_rx.recv().await {
                on_ended(id);
            }
        });

        tracing::info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Audio output opened"
        );

        Ok(Self {
            timeline,
            commands: Mutex::new(command_tx),
            audio_thread: Some(audio_thread),
            dispatcher,
            format,
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    async fn send(&self, command: impl FnOnce(Reply) -> StreamCommand) -> Result<(), AudioDeviceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .lock()
            .send(command(reply_tx))
            .map_err(|_| AudioDeviceError::Unavailable("audio thread stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| AudioDeviceError::Unavailable("audio thread stopped".to_string()))?
            .map_err(AudioDeviceError::Unavailable)
    }
}

impl Drop for CpalAudioDevice {
    fn drop(&mut self) {
        let _ = self.commands.lock().send(StreamCommand::Shutdown);
        if let Some(audio_thread) = self.audio_thread.take() {
            let _ = audio_thread.join();
        }
        self.dispatcher.abort();
    }
}

/// 音频线程主循环：建立输出流后等待命令
fn run_stream(
    timeline: Arc<VirtualTimeline>,
    ended_tx: mpsc::UnboundedSender<EndedSource>,
    commands: std_mpsc::Receiver<StreamCommand>,
    ready: std_mpsc::Sender<Result<OutputFormat, String>>,
) {
    let stream = match open_stream(timeline, ended_tx) {
        Ok((stream, format)) => {
            let _ = ready.send(Ok(format));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Play(reply) => {
                let _ = reply.send(stream.play().map_err(|e| e.to_string()));
            }
            StreamCommand::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| e.to_string()));
            }
            StreamCommand::Shutdown => break,
        }
    }

    tracing::debug!("Audio output thread exiting");
}

fn open_stream(
    timeline: Arc<VirtualTimeline>,
    ended_tx: mpsc::UnboundedSender<EndedSource>,
) -> Result<(cpal::Stream, OutputFormat), String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| "no default output device".to_string())?;
    let supported = device
        .default_output_config()
        .map_err(|e| format!("no output config: {}", e))?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let format = OutputFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, timeline, ended_tx),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, timeline, ended_tx),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, timeline, ended_tx),
        other => return Err(format!("unsupported sample format {:?}", other)),
    }
    .map_err(|e| format!("cannot build output stream: {}", e))?;

    stream.play().map_err(|e| format!("cannot start output stream: {}", e))?;
    Ok((stream, format))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    timeline: Arc<VirtualTimeline>,
    ended_tx: mpsc::UnboundedSender<EndedSource>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;
    let mut mix: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            mix.resize(data.len(), 0.0);
            for ended in timeline.render(&mut mix, channels, sample_rate) {
                let _ = ended_tx.send(ended);
            }
            for (out, sample) in data.iter_mut().zip(mix.iter()) {
                *out = T::from_sample(*sample);
            }
        },
        |err| tracing::error!(error = %err, "Audio output stream error"),
        None,
    )
}

#[async_trait]
impl AudioDevicePort for CpalAudioDevice {
    fn is_available(&self) -> bool {
        !self.dispatcher.is_finished()
    }

    fn current_time(&self) -> f64 {
        self.timeline.now()
    }

    fn state(&self) -> DeviceState {
        if self.timeline.is_suspended() {
            DeviceState::Suspended
        } else {
            DeviceState::Running
        }
    }

    async fn suspend(&self) -> Result<(), AudioDeviceError> {
        // 先冻结时钟，暂停生效前的回调只输出静音
        self.timeline.set_suspended(true);
        self.send(StreamCommand::Pause).await
    }

    async fn resume(&self) -> Result<(), AudioDeviceError> {
        self.send(StreamCommand::Play).await?;
        self.timeline.set_suspended(false);
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        self.timeline.set_gain(gain);
    }

    fn gain(&self) -> f32 {
        self.timeline.gain()
    }

    fn start_source(
        &self,
        spec: SourceSpec,
        on_ended: EndedCallback,
    ) -> Result<SourceId, AudioDeviceError> {
        self.timeline.start(spec, on_ended)
    }

    fn stop_source(&self, id: SourceId) {
        self.timeline.stop(id);
    }
}
