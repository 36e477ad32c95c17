//! WebAssembly text fixtures for host tests
//!
//! Every guest shares one layout: the descriptor frame at 16, canned
//! response frames at 2048 and 4096, search needles from 6144, a raw bad
//! frame at 7168, and a bump allocator starting at 8192.

#![allow(dead_code)]

use model_plugin_api::{codec, encode_frame, PluginDescriptor};

const YES_FRAME: i32 = 2048;
const NO_FRAME: i32 = 4096;
const NEEDLE_C2F: i32 = 6144;
const NEEDLE_SPPF: i32 = 6160;
const NEEDLE_DETECT: i32 = 6176;
const BAD_FRAME: i32 = 7168;

pub const YOLO_YES: &str =
    r#"{"recognized":true,"family":"YOLOv8","variant":"n","task":"detect","confidence":0.92}"#;
pub const YOLO_NO: &str = r#"{"recognized":false}"#;

/// What the guest's `recognize` export does
#[derive(Debug, Clone)]
pub enum Recognize {
    /// Answer with a frame holding the input bytes unchanged
    PassThrough,
    /// Always answer with this JSON
    Fixed(String),
    /// YES if the input mentions "C2f", "SPPF" and "Detect" as JSON strings
    Yolo,
    /// Trap
    Trap,
    /// Return this pointer as-is
    Pointer(i32),
    /// Return a pointer to a frame whose header is this value
    BadHeader(i32),
    /// Loop forever
    Spin,
}

/// What an optional lifecycle hook does, if exported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Absent,
    Noop,
    Trap,
    /// Calls the `fd_write` stub once
    CallsStub,
}

#[derive(Debug, Clone)]
pub struct GuestBuilder {
    descriptor_json: String,
    recognize: Recognize,
    recognize_calls_stub: bool,
    omit: Option<&'static str>,
    on_load: Hook,
    on_unload: Hook,
    extra_import: Option<&'static str>,
}

fn wat_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
}

fn framed(json: &str) -> String {
    wat_bytes(&encode_frame(json.as_bytes()).unwrap())
}

pub fn descriptor(id: &str) -> PluginDescriptor {
    PluginDescriptor::new(id, format!("{} plugin", id), "1.0.0")
        .description("test fixture")
        .format("onnx")
}

impl GuestBuilder {
    pub fn new(id: &str) -> Self {
        Self::with_descriptor(&descriptor(id))
    }

    pub fn with_descriptor(descriptor: &PluginDescriptor) -> Self {
        Self {
            descriptor_json: codec::encode_descriptor(descriptor).unwrap(),
            recognize: Recognize::Fixed(YOLO_NO.to_string()),
            recognize_calls_stub: false,
            omit: None,
            on_load: Hook::Absent,
            on_unload: Hook::Absent,
            extra_import: None,
        }
    }

    /// Use a raw (possibly invalid) descriptor payload
    pub fn raw_descriptor(mut self, json: &str) -> Self {
        self.descriptor_json = json.to_string();
        self
    }

    pub fn recognize(mut self, recognize: Recognize) -> Self {
        self.recognize = recognize;
        self
    }

    /// Make `recognize` call the `fd_write` stub before answering
    pub fn recognize_calls_stub(mut self) -> Self {
        self.recognize_calls_stub = true;
        self
    }

    /// Keep the item but do not export it under this name
    pub fn omit(mut self, export: &'static str) -> Self {
        self.omit = Some(export);
        self
    }

    pub fn on_load(mut self, hook: Hook) -> Self {
        self.on_load = hook;
        self
    }

    pub fn on_unload(mut self, hook: Hook) -> Self {
        self.on_unload = hook;
        self
    }

    /// Import a function from a namespace the host does not provide
    pub fn import_unknown(mut self, name: &'static str) -> Self {
        self.extra_import = Some(name);
        self
    }

    fn export(&self, name: &str) -> String {
        if self.omit == Some(name) {
            String::new()
        } else {
            format!(r#"(export "{}")"#, name)
        }
    }

    fn hook(&self, name: &str, hook: Hook) -> String {
        let body = match hook {
            Hook::Absent => return String::new(),
            Hook::Noop => "",
            Hook::Trap => "unreachable",
            Hook::CallsStub => "(drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0)))",
        };
        format!("(func {} {})", self.export(name), body)
    }

    fn recognize_body(&self) -> String {
        let answer = match &self.recognize {
            Recognize::PassThrough => r#"
                (local.set $out (call $alloc (i32.add (local.get $len) (i32.const 4))))
                (i32.store (local.get $out) (local.get $len))
                (memory.copy
                  (i32.add (local.get $out) (i32.const 4))
                  (local.get $ptr)
                  (local.get $len))
                (local.get $out)"#
                .to_string(),
            Recognize::Fixed(_) => format!("(i32.const {})", YES_FRAME),
            Recognize::Yolo => format!(
                r#"
                (if (result i32)
                  (i32.and
                    (i32.and
                      (call $contains (local.get $ptr) (local.get $len) (i32.const {c2f}) (i32.const 5))
                      (call $contains (local.get $ptr) (local.get $len) (i32.const {sppf}) (i32.const 6)))
                    (call $contains (local.get $ptr) (local.get $len) (i32.const {detect}) (i32.const 8)))
                  (then (i32.const {yes}))
                  (else (i32.const {no})))"#,
                c2f = NEEDLE_C2F,
                sppf = NEEDLE_SPPF,
                detect = NEEDLE_DETECT,
                yes = YES_FRAME,
                no = NO_FRAME,
            ),
            Recognize::Trap => "(unreachable)".to_string(),
            Recognize::Pointer(ptr) => format!("(i32.const {})", ptr),
            Recognize::BadHeader(_) => format!("(i32.const {})", BAD_FRAME),
            Recognize::Spin => "(loop $forever (br $forever)) (i32.const 0)".to_string(),
        };

        let stub = if self.recognize_calls_stub {
            "(drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0)))"
        } else {
            ""
        };
        format!("{}\n{}", stub, answer)
    }

    pub fn wat(&self) -> String {
        let yes = match &self.recognize {
            Recognize::Fixed(json) => json.clone(),
            _ => YOLO_YES.to_string(),
        };
        let bad_header = match &self.recognize {
            Recognize::BadHeader(len) => wat_bytes(&len.to_le_bytes()),
            _ => String::new(),
        };
        let extra_import = match self.extra_import {
            Some(name) => format!(r#"(import "env" "{}" (func))"#, name),
            None => String::new(),
        };

        format!(
            r#"(module
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  {extra_import}
  (memory {memory_export} 1)
  (global $heap (mut i32) (i32.const 8192))

  (data (i32.const 16) "{descriptor}")
  (data (i32.const {yes_at}) "{yes}")
  (data (i32.const {no_at}) "{no}")
  (data (i32.const {c2f_at}) "\"C2f\"")
  (data (i32.const {sppf_at}) "\"SPPF\"")
  (data (i32.const {detect_at}) "\"Detect\"")
  (data (i32.const {bad_at}) "{bad_header}")

  (func $alloc {alloc_export} (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap
      (i32.and
        (i32.add (i32.add (global.get $heap) (local.get $size)) (i32.const 7))
        (i32.const -8)))
    (local.get $ptr))

  (func {dealloc_export} (param i32 i32))

  (func {info_export} (result i32)
    (i32.const 16))

  (func $contains (param $hay i32) (param $hay_len i32) (param $needle i32) (param $needle_len i32) (result i32)
    (local $i i32)
    (local $j i32)
    (block $not_found
      (loop $outer
        (br_if $not_found
          (i32.gt_u (i32.add (local.get $i) (local.get $needle_len)) (local.get $hay_len)))
        (local.set $j (i32.const 0))
        (block $mismatch
          (loop $inner
            (if (i32.eq (local.get $j) (local.get $needle_len))
              (then (return (i32.const 1))))
            (br_if $mismatch
              (i32.ne
                (i32.load8_u (i32.add (local.get $hay) (i32.add (local.get $i) (local.get $j))))
                (i32.load8_u (i32.add (local.get $needle) (local.get $j)))))
            (local.set $j (i32.add (local.get $j) (i32.const 1)))
            (br $inner)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $outer)))
    (i32.const 0))

  (func {recognize_export} (param $ptr i32) (param $len i32) (result i32)
    (local $out i32)
    {recognize_body})

  {on_load}
  {on_unload}
)"#,
            extra_import = extra_import,
            memory_export = self.export("memory"),
            descriptor = framed(&self.descriptor_json),
            yes_at = YES_FRAME,
            yes = framed(&yes),
            no_at = NO_FRAME,
            no = framed(YOLO_NO),
            c2f_at = NEEDLE_C2F,
            sppf_at = NEEDLE_SPPF,
            detect_at = NEEDLE_DETECT,
            bad_at = BAD_FRAME,
            bad_header = bad_header,
            alloc_export = self.export("plugin_alloc"),
            dealloc_export = self.export("plugin_dealloc"),
            info_export = self.export("plugin_info"),
            recognize_export = self.export("recognize"),
            recognize_body = self.recognize_body(),
            on_load = self.hook("on_load", self.on_load),
            on_unload = self.hook("on_unload", self.on_unload),
        )
    }

    pub fn build(&self) -> Vec<u8> {
        self.wat().into_bytes()
    }
}
