//! Every-Nth-frame sampling over a [`FrameSource`].

use facematch_vision::FrameSource;
use image::DynamicImage;

use crate::error::StreamEnd;

/// A frame selected for extraction, with its 1-based position in the stream.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub index: usize,
    pub image: DynamicImage,
}

/// What a finished sampler saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerReport {
    pub frames_read: usize,
    pub frames_sampled: usize,
    /// `None` when the consumer stopped before the stream ended.
    pub end: Option<StreamEnd>,
}

/// Lazy, single-pass iterator yielding frames whose index is a multiple of
/// `interval`.
///
/// Owns the source; the source is released when the sampler is dropped or
/// [`finish`](Self::finish)ed.
pub struct FrameSampler<S> {
    source: S,
    interval: usize,
    frames_read: usize,
    frames_sampled: usize,
    end: Option<StreamEnd>,
}

impl<S: FrameSource> FrameSampler<S> {
    /// `interval` is clamped to at least 1.
    pub fn new(source: S, interval: usize) -> Self {
        Self {
            source,
            interval: interval.max(1),
            frames_read: 0,
            frames_sampled: 0,
            end: None,
        }
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// Releases the source and reports what was read.
    pub fn finish(self) -> SamplerReport {
        SamplerReport {
            frames_read: self.frames_read,
            frames_sampled: self.frames_sampled,
            end: self.end,
        }
    }
}

impl<S: FrameSource> Iterator for FrameSampler<S> {
    type Item = SampledFrame;

    fn next(&mut self) -> Option<SampledFrame> {
        while self.end.is_none() {
            match self.source.read_frame() {
                Ok(Some(frame)) => {
                    self.frames_read += 1;
                    if self.frames_read % self.interval != 0 {
                        continue;
                    }
                    self.frames_sampled += 1;
                    log::debug!("sampled frame {}", self.frames_read);
                    return Some(SampledFrame {
                        index: self.frames_read,
                        image: DynamicImage::ImageRgb8(frame),
                    });
                }
                Ok(None) => self.end = Some(StreamEnd::Exhausted),
                Err(e) => {
                    log::warn!(
                        "stopping at frame {}: decode failed: {:#}",
                        self.frames_read,
                        e
                    );
                    self.end = Some(StreamEnd::DecodeFailed {
                        after_frame: self.frames_read,
                        reason: format!("{:#}", e),
                    });
                }
            }
        }
        None
    }
}

impl<S: FrameSource> std::iter::FusedIterator for FrameSampler<S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    /// Yields `total` 1x1 frames, optionally failing once `fail_at` frames were read.
    struct Counting {
        total: usize,
        fail_at: Option<usize>,
        reads: usize,
    }

    impl FrameSource for Counting {
        fn read_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
            if Some(self.reads) == self.fail_at {
                anyhow::bail!("corrupt packet");
            }
            if self.reads == self.total {
                return Ok(None);
            }
            self.reads += 1;
            Ok(Some(RgbImage::new(1, 1)))
        }
    }

    fn source(total: usize) -> Counting {
        Counting {
            total,
            fail_at: None,
            reads: 0,
        }
    }

    #[test]
    fn test_keeps_every_tenth_frame() {
        let indices: Vec<usize> = FrameSampler::new(source(95), 10).map(|f| f.index).collect();
        assert_eq!(indices, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn test_sample_count_is_floor_of_ratio() {
        for total in [0, 1, 9, 10, 11, 99, 100, 101] {
            let mut sampler = FrameSampler::new(source(total), 10);
            let sampled = sampler.by_ref().count();
            assert_eq!(sampled, total / 10, "total={}", total);
            let report = sampler.finish();
            assert_eq!(report.frames_read, total);
            assert_eq!(report.frames_sampled, total / 10);
            assert_eq!(report.end, Some(StreamEnd::Exhausted));
        }
    }

    #[test]
    fn test_interval_one_keeps_everything() {
        assert_eq!(FrameSampler::new(source(4), 1).count(), 4);
        assert_eq!(FrameSampler::new(source(4), 0).count(), 4);
    }

    #[test]
    fn test_decode_failure_is_a_distinct_end() {
        let src = Counting {
            total: 50,
            fail_at: Some(25),
            reads: 0,
        };
        let mut sampler = FrameSampler::new(src, 10);
        assert_eq!(sampler.by_ref().count(), 2);
        assert!(sampler.next().is_none());
        match sampler.finish().end {
            Some(StreamEnd::DecodeFailed { after_frame, .. }) => assert_eq!(after_frame, 25),
            other => panic!("unexpected end {:?}", other),
        }
    }

    #[test]
    fn test_does_not_read_past_what_is_consumed() {
        let mut sampler = FrameSampler::new(source(100), 10);
        let first = sampler.next().unwrap();
        assert_eq!(first.index, 10);
        assert_eq!(sampler.frames_read(), 10);
        let report = sampler.finish();
        assert_eq!(report.end, None);
    }
}
