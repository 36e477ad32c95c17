//! YOLO Plugin - Using model-plugin-sdk
//!
//! Recognizes YOLOv8 detection models by their signature blocks and picks
//! the size variant from the parameter count.
//!
//! ```bash
//! cargo build --target wasm32-unknown-unknown --release
//! ```

use model_plugin_sdk::prelude::*;

const SIGNATURE_BLOCKS: [&str; 3] = ["C2f", "SPPF", "Detect"];

struct YoloPlugin;

fn variant(total_params: i64) -> &'static str {
    match total_params {
        p if p < 5_000_000 => "n",
        p if p < 15_000_000 => "s",
        p if p < 35_000_000 => "m",
        p if p < 55_000_000 => "l",
        _ => "x",
    }
}

impl Plugin for YoloPlugin {
    fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new("yolo-detector", "YOLO Detector", "0.1.0")
            .description("Recognizes YOLOv8 detection models")
            .format("onnx")
            .format("safetensors")
            .meta("author", "model-plugins")
    }

    fn recognize(request: RecognitionRequest) -> RecognitionResponse {
        if !SIGNATURE_BLOCKS.iter().all(|b| request.has_block(b)) {
            return RecognitionResponse::unrecognized().meta("detected_by", "yolo-detector");
        }

        RecognitionResponse::recognized("YOLOv8")
            .variant(variant(request.total_params))
            .task("detect")
            .confidence(0.95)
            .meta("detected_by", "yolo-detector")
    }
}

export_plugin!(YoloPlugin);
