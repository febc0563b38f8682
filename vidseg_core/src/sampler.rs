use crate::consts::{DEFAULT_SAMPLING_FRAME_NUM, DEFAULT_SAMPLING_FRAME_RANGE};
use anyhow::Result;
use log::debug;
use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SamplerError {
    #[error("The number of frames to sample must be positive.")]
    ZeroFrameNum,
    #[error("Sampling frame ratio must be within (0, 1], got {0}.")]
    InvalidRatio(f64),
    #[error("Subsampling by ratio supports a single frame only, but {0} frames are requested.")]
    RatioRequiresSingleFrame(usize),
    #[error("The window of radius {range} cannot supply {needed} distinct neighbour frames.")]
    RangeTooNarrow { range: usize, needed: usize },
    #[error("Cannot sample frames from an empty video.")]
    EmptyVideo,
    #[error("Reference frame {reference} of a video of length {length} has {available} neighbour frames, but {needed} are requested.")]
    NotEnoughNeighbours {
        reference: usize,
        length: usize,
        available: usize,
        needed: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// One frame taken from a uniformly subsampled grid.
    Ratio,
    /// A contiguous block of `2R + 1` frames.
    FullWindow,
    /// A reference frame plus distinct neighbours within radius `R`.
    Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfiguration {
    pub sampling_frame_num: usize,
    pub sampling_frame_range: usize,
    pub sampling_frame_shuffle: bool,
    pub reverse_agu: bool,
    pub sampling_frame_ratio: f64,
}

impl Default for SamplerConfiguration {
    fn default() -> Self {
        Self {
            sampling_frame_num: DEFAULT_SAMPLING_FRAME_NUM,
            sampling_frame_range: DEFAULT_SAMPLING_FRAME_RANGE,
            sampling_frame_shuffle: false,
            reverse_agu: false,
            sampling_frame_ratio: 1.0,
        }
    }
}

impl SamplerConfiguration {
    pub fn mode(&self) -> SamplingMode {
        if self.sampling_frame_ratio < 1.0 {
            SamplingMode::Ratio
        } else if self.sampling_frame_range * 2 + 1 == self.sampling_frame_num {
            SamplingMode::FullWindow
        } else {
            SamplingMode::Range
        }
    }

    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.sampling_frame_num == 0 {
            return Err(SamplerError::ZeroFrameNum);
        }
        if !(self.sampling_frame_ratio > 0.0 && self.sampling_frame_ratio <= 1.0) {
            return Err(SamplerError::InvalidRatio(self.sampling_frame_ratio));
        }
        match self.mode() {
            SamplingMode::Ratio if self.sampling_frame_num != 1 => Err(
                SamplerError::RatioRequiresSingleFrame(self.sampling_frame_num),
            ),
            SamplingMode::Range if self.sampling_frame_range * 2 < self.sampling_frame_num - 1 => {
                Err(SamplerError::RangeTooNarrow {
                    range: self.sampling_frame_range,
                    needed: self.sampling_frame_num - 1,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Chooses which frames of a video form a training clip.
///
#[derive(Debug, Clone)]
pub struct FrameSampler {
    conf: SamplerConfiguration,
}

impl FrameSampler {
    pub fn new(conf: SamplerConfiguration) -> Result<Self> {
        conf.validate()?;
        Ok(Self { conf })
    }

    pub fn get_configuration(&self) -> &SamplerConfiguration {
        &self.conf
    }

    pub fn all_frames(video_length: usize) -> Vec<usize> {
        (0..video_length).collect()
    }

    pub fn select_frames<R: Rng + ?Sized>(
        &self,
        video_length: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        if video_length == 0 {
            return Err(SamplerError::EmptyVideo.into());
        }
        let selected = match self.conf.mode() {
            SamplingMode::Ratio => vec![self.select_by_ratio(video_length, rng)],
            SamplingMode::FullWindow => self.select_window(video_length, rng),
            SamplingMode::Range => self.select_range(video_length, rng)?,
        };
        debug!(
            "Selected frames {:?} of {} in {:?} mode",
            selected,
            video_length,
            self.conf.mode()
        );
        Ok(selected)
    }

    /// Frames of one clip: all frames in order for inference, otherwise the
    /// sampled frames, shuffled when configured.
    pub fn clip_indices<R: Rng + ?Sized>(
        &self,
        video_length: usize,
        is_train: bool,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        if !is_train {
            return Ok(Self::all_frames(video_length));
        }
        let mut selected = self.select_frames(video_length, rng)?;
        if self.conf.sampling_frame_shuffle {
            selected.shuffle(rng);
        }
        Ok(selected)
    }

    fn select_by_ratio<R: Rng + ?Sized>(&self, video_length: usize, rng: &mut R) -> usize {
        let subsampled =
            ((video_length as f64 * self.conf.sampling_frame_ratio).round_ties_even() as usize).max(1);
        if subsampled > 1 {
            let bin = rng.random_range(0..subsampled);
            bin * video_length / subsampled
        } else {
            video_length / 2
        }
    }

    fn select_window<R: Rng + ?Sized>(&self, video_length: usize, rng: &mut R) -> Vec<usize> {
        let num = self.conf.sampling_frame_num;
        let mut selected = if num > video_length {
            let mut idx = Self::all_frames(video_length);
            idx.extend((0..num - video_length).map(|_| rng.random_range(0..video_length)));
            idx.sort_unstable();
            idx
        } else {
            let start = if video_length == num {
                0
            } else {
                rng.random_range(0..=video_length - num)
            };
            (start..start + num).collect()
        };
        if self.conf.reverse_agu && rng.random_bool(0.5) {
            selected.reverse();
        }
        selected
    }

    fn select_range<R: Rng + ?Sized>(&self, video_length: usize, rng: &mut R) -> Result<Vec<usize>> {
        let range = self.conf.sampling_frame_range;
        let needed = self.conf.sampling_frame_num - 1;
        let reference = rng.random_range(0..video_length);
        let start = reference.saturating_sub(range);
        let end = video_length.min(reference + range + 1);
        let candidates = (start..reference)
            .chain(reference + 1..end)
            .collect::<Vec<_>>();
        if candidates.len() < needed {
            return Err(SamplerError::NotEnoughNeighbours {
                reference,
                length: video_length,
                available: candidates.len(),
                needed,
            }
            .into());
        }
        let mut selected = index::sample(rng, candidates.len(), needed)
            .into_iter()
            .map(|i| candidates[i])
            .collect::<Vec<_>>();
        selected.push(reference);
        selected.sort_unstable();
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sampler(num: usize, range: usize) -> FrameSampler {
        FrameSampler::new(SamplerConfiguration {
            sampling_frame_num: num,
            sampling_frame_range: range,
            ..Default::default()
        })
        .unwrap()
    }

    fn error_of(e: anyhow::Error) -> SamplerError {
        e.downcast::<SamplerError>().unwrap()
    }

    #[test]
    fn test_modes() {
        assert_eq!(sampler(3, 1).get_configuration().mode(), SamplingMode::FullWindow);
        assert_eq!(sampler(2, 5).get_configuration().mode(), SamplingMode::Range);
        let conf = SamplerConfiguration {
            sampling_frame_num: 1,
            sampling_frame_ratio: 0.5,
            ..Default::default()
        };
        assert_eq!(conf.mode(), SamplingMode::Ratio);
    }

    #[test]
    fn test_invalid_configurations() {
        let ratio = SamplerConfiguration {
            sampling_frame_num: 2,
            sampling_frame_ratio: 0.5,
            ..Default::default()
        };
        assert_eq!(
            error_of(FrameSampler::new(ratio).unwrap_err()),
            SamplerError::RatioRequiresSingleFrame(2)
        );
        let zero = SamplerConfiguration {
            sampling_frame_num: 0,
            ..Default::default()
        };
        assert_eq!(
            error_of(FrameSampler::new(zero).unwrap_err()),
            SamplerError::ZeroFrameNum
        );
        let narrow = SamplerConfiguration {
            sampling_frame_num: 6,
            sampling_frame_range: 2,
            ..Default::default()
        };
        assert_eq!(
            error_of(FrameSampler::new(narrow).unwrap_err()),
            SamplerError::RangeTooNarrow {
                range: 2,
                needed: 5
            }
        );
        let ratio = SamplerConfiguration {
            sampling_frame_num: 1,
            sampling_frame_ratio: 0.0,
            ..Default::default()
        };
        assert!(FrameSampler::new(ratio).is_err());
    }

    #[test]
    fn test_full_window_strictly_increasing() {
        let mut rng = StdRng::seed_from_u64(1);
        for length in 3..40 {
            for radius in 0..=(length - 1) / 2 {
                let s = sampler(radius * 2 + 1, radius);
                for _ in 0..5 {
                    let idx = s.select_frames(length, &mut rng).unwrap();
                    assert_eq!(idx.len(), radius * 2 + 1);
                    assert!(idx.windows(2).all(|w| w[1] == w[0] + 1));
                    assert!(*idx.last().unwrap() < length);
                }
            }
        }
    }

    #[test]
    fn test_full_window_reaches_last_frame() {
        let s = sampler(3, 1);
        let mut rng = StdRng::seed_from_u64(3);
        let reached = (0..200).any(|_| s.select_frames(5, &mut rng).unwrap() == vec![2, 3, 4]);
        assert!(reached);
    }

    #[test]
    fn test_full_window_equal_length() {
        let s = sampler(5, 2);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(s.select_frames(5, &mut rng).unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_full_window_padding() {
        let s = sampler(7, 3);
        let mut rng = StdRng::seed_from_u64(5);
        let idx = s.select_frames(3, &mut rng).unwrap();
        assert_eq!(idx.len(), 7);
        assert!(idx.windows(2).all(|w| w[0] <= w[1]));
        for f in 0..3 {
            assert!(idx.contains(&f));
        }
        assert!(idx.iter().all(|i| *i < 3));
    }

    #[test]
    fn test_reverse_augmentation() {
        let s = FrameSampler::new(SamplerConfiguration {
            sampling_frame_num: 3,
            sampling_frame_range: 1,
            reverse_agu: true,
            ..Default::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen_reversed = false;
        let mut seen_forward = false;
        for _ in 0..100 {
            let idx = s.select_frames(10, &mut rng).unwrap();
            if idx[0] > idx[2] {
                seen_reversed = true;
                assert!(idx.windows(2).all(|w| w[0] == w[1] + 1));
            } else {
                seen_forward = true;
            }
        }
        assert!(seen_reversed && seen_forward);
    }

    #[test]
    fn test_range_mode() {
        let s = sampler(3, 4);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..200 {
            let idx = s.select_frames(30, &mut rng).unwrap();
            assert_eq!(idx.len(), 3);
            assert!(idx.windows(2).all(|w| w[0] < w[1]));
            assert!(idx[2] - idx[0] <= 8);
        }
    }

    #[test]
    fn test_range_mode_not_enough_neighbours() {
        let s = sampler(4, 5);
        let mut rng = StdRng::seed_from_u64(2);
        let err = s.select_frames(2, &mut rng).unwrap_err();
        assert!(matches!(
            error_of(err),
            SamplerError::NotEnoughNeighbours {
                available: 1,
                needed: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_ratio_mode() {
        let s = FrameSampler::new(SamplerConfiguration {
            sampling_frame_num: 1,
            sampling_frame_ratio: 0.5,
            ..Default::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let idx = s.select_frames(10, &mut rng).unwrap();
            assert_eq!(idx.len(), 1);
            assert_eq!(idx[0] % 2, 0);
        }
        // a single bin picks the middle frame
        assert_eq!(s.select_frames(1, &mut rng).unwrap(), vec![0]);
        let s = FrameSampler::new(SamplerConfiguration {
            sampling_frame_num: 1,
            sampling_frame_ratio: 0.1,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(s.select_frames(7, &mut rng).unwrap(), vec![3]);
    }

    #[test]
    fn test_empty_video() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            error_of(sampler(3, 1).select_frames(0, &mut rng).unwrap_err()),
            SamplerError::EmptyVideo
        );
    }

    #[test]
    fn test_deterministic() {
        let s = sampler(5, 6);
        let a = s
            .select_frames(100, &mut StdRng::seed_from_u64(42))
            .unwrap();
        let b = s
            .select_frames(100, &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_clip_indices() {
        let s = FrameSampler::new(SamplerConfiguration {
            sampling_frame_num: 5,
            sampling_frame_range: 2,
            sampling_frame_shuffle: true,
            ..Default::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(s.clip_indices(4, false, &mut rng).unwrap(), vec![0, 1, 2, 3]);
        let mut idx = s.clip_indices(20, true, &mut rng).unwrap();
        idx.sort_unstable();
        assert!(idx.windows(2).all(|w| w[1] == w[0] + 1));
    }
}
