//! 基于 leptess（libtesseract 绑定）的文字检测引擎
//!
//! 每个工作线程持有一个 `LepTess` 实例，语言数据只在创建时加载一次。
//! 帧编码为 PNG 交给引擎，TSV 结果里的单词按 (block, par, line) 合并为行级检测。
//! 需要 `tesseract` feature 和系统里的 libtesseract / libleptonica。

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use crate::core::detection::detector::{RawDetection, TextDetector, TextRegion};
use crate::core::error::{IndexerError, Result};
use crate::core::video::frame::Frame;

/// 传给引擎的分辨率提示，视频帧没有 DPI 信息
#[cfg(feature = "tesseract")]
const SOURCE_RESOLUTION: i32 = 70;

pub struct TesseractDetector {
    #[cfg(feature = "tesseract")]
    engine: leptess::LepTess,
    language: String,
}

impl TesseractDetector {
    /// 加载语言数据。tessdata 缺失或语言不存在时返回 EngineInit
    #[cfg(feature = "tesseract")]
    pub fn new(data_path: Option<&Path>, language: &str) -> Result<Self> {
        let data_path = match data_path {
            Some(p) => Some(p.to_str().ok_or_else(|| {
                IndexerError::EngineInit(format!("tessdata path {:?} is not valid UTF-8", p))
            })?),
            None => None,
        };
        let engine = leptess::LepTess::new(data_path, language)
            .map_err(|e| IndexerError::EngineInit(format!("tesseract init ({}): {:?}", language, e)))?;

        log::info!("🔧 Tesseract ready: language {}", language);
        Ok(Self {
            engine,
            language: language.to_string(),
        })
    }

    #[cfg(not(feature = "tesseract"))]
    pub fn new(data_path: Option<&Path>, language: &str) -> Result<Self> {
        Err(IndexerError::EngineInit(format!(
            "built without the `tesseract` feature, cannot load {} (tessdata: {:?})",
            language, data_path
        )))
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    #[cfg(feature = "tesseract")]
    fn recognize_tsv(&mut self, png: &[u8]) -> Result<String> {
        self.engine
            .set_image_from_mem(png)
            .map_err(|e| IndexerError::DetectionEngineTransient(format!("set_image: {:?}", e)))?;
        self.engine.set_source_resolution(SOURCE_RESOLUTION);
        self.engine
            .get_tsv_text(0)
            .map_err(|e| IndexerError::DetectionEngineTransient(format!("tsv output: {}", e)))
    }

    #[cfg(not(feature = "tesseract"))]
    fn recognize_tsv(&mut self, _png: &[u8]) -> Result<String> {
        Err(IndexerError::DetectionEngineTransient(
            "built without the `tesseract` feature".to_string(),
        ))
    }
}

impl TextDetector for TesseractDetector {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let png = frame.encode_png().ok_or_else(|| {
            IndexerError::DetectionEngineTransient(format!(
                "frame {} could not be encoded",
                frame.frame_number
            ))
        })?;

        let tsv = self.recognize_tsv(&png)?;
        let detections = parse_tsv(&tsv);
        debug!("🔤 Frame {}: {} text lines", frame.frame_number, detections.len());
        Ok(detections)
    }
}

#[derive(Default)]
struct LineAccumulator {
    words: Vec<String>,
    confidence_sum: f32,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

/// 按行合并 TSV 里的单词（level 5）。引擎输出的 TSV 不带表头时也能解析。
pub fn parse_tsv(tsv: &str) -> Vec<RawDetection> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), LineAccumulator> = BTreeMap::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }

        let text = cols[11].trim();
        let Ok(conf) = cols[10].parse::<f32>() else {
            continue;
        };
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let nums: Vec<u32> = cols[1..10].iter().filter_map(|c| c.parse().ok()).collect();
        if nums.len() != 9 {
            continue;
        }
        let (page, block, par, line) = (nums[0], nums[1], nums[2], nums[3]);
        let (left, top, width, height) = (nums[5] as f32, nums[6] as f32, nums[7] as f32, nums[8] as f32);

        let acc = lines.entry((page, block, par, line)).or_insert_with(|| LineAccumulator {
            left: f32::MAX,
            top: f32::MAX,
            ..Default::default()
        });
        acc.words.push(text.to_string());
        acc.confidence_sum += conf;
        acc.left = acc.left.min(left);
        acc.top = acc.top.min(top);
        acc.right = acc.right.max(left + width);
        acc.bottom = acc.bottom.max(top + height);
    }

    lines
        .into_values()
        .map(|acc| RawDetection {
            region: TextRegion::from_rect(acc.left, acc.top, acc.right - acc.left, acc.bottom - acc.top),
            confidence: acc.confidence_sum / acc.words.len() as f32 / 100.0,
            text: acc.words.join(" "),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
             4\t1\t1\t1\t1\t0\t100\t50\t200\t30\t-1\t\n\
             5\t1\t1\t1\t1\t1\t100\t50\t80\t30\t96.5\tSHIPMENT\n\
             5\t1\t1\t1\t1\t2\t190\t52\t110\t28\t91.5\tRECEIVED\n\
             5\t1\t2\t1\t1\t1\t20\t400\t90\t25\t88\tMSI-123\n"
        );

        let detections = parse_tsv(&tsv);
        assert_eq!(detections.len(), 2);

        assert_eq!(detections[0].text, "SHIPMENT RECEIVED");
        assert!((detections[0].confidence - 0.94).abs() < 1e-4);
        assert_eq!(detections[0].region.bounds(), (100.0, 50.0, 300.0, 80.0));

        assert_eq!(detections[1].text, "MSI-123");
        assert!((detections[1].confidence - 0.88).abs() < 1e-4);
    }

    #[test]
    fn test_parse_tsv_skips_blank_and_negative_confidence() {
        let tsv = format!(
            "{HEADER}\n\
             5\t1\t1\t1\t1\t1\t10\t10\t5\t5\t-1\t \n\
             5\t1\t1\t1\t1\t2\t10\t10\t5\t5\t55\t\n\
             5\t1\t1\t1\tbad\t3\t10\t10\t5\t5\t55\tX\n"
        );
        assert!(parse_tsv(&tsv).is_empty());
    }

    #[test]
    fn test_parse_tsv_without_header() {
        let tsv = "5\t1\t1\t1\t1\t1\t10\t20\t30\t10\t90\tGATE\n";
        let detections = parse_tsv(tsv);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "GATE");
        assert_eq!(detections[0].region.bounds(), (10.0, 20.0, 40.0, 30.0));
    }

    #[test]
    fn test_missing_language_data_is_engine_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TesseractDetector::new(Some(dir.path()), "no_such_language");
        assert!(matches!(result, Err(IndexerError::EngineInit(_))));
    }
}
