//! End-to-end lifecycle tests driving the capability layer with an
//! in-memory backend.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use lucent_core::ResourceLedger;
use lucent_graphics::{
    Color, DeviceLayout, GpuCommandBuffer, GpuDevice, GpuFrame, GpuInstance, GpuProvider,
    GraphicsError, PresentationTarget, Result, SurfaceExtent, SwapchainLayout,
};

type EventLog = Rc<RefCell<Vec<String>>>;

fn log(events: &EventLog, event: impl Into<String>) {
    events.borrow_mut().push(event.into());
}

struct MockProvider {
    supported: bool,
    events: EventLog,
}

impl GpuProvider for MockProvider {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create_instance(&self, ledger: &mut ResourceLedger) -> Result<Box<dyn GpuInstance>> {
        log(&self.events, "create instance");
        let events = Rc::clone(&self.events);
        ledger.push("mock instance", move || {
            log(&events, "destroy instance");
            Ok(())
        });
        Ok(Box::new(MockInstance {
            events: Rc::clone(&self.events),
        }))
    }
}

struct MockInstance {
    events: EventLog,
}

impl GpuInstance for MockInstance {
    fn supports_layout(&self, layout: DeviceLayout) -> bool {
        layout == DeviceLayout::SimpleDeferred
    }

    fn create_device(
        &self,
        layout: DeviceLayout,
        ledger: &mut ResourceLedger,
    ) -> Result<Box<dyn GpuDevice>> {
        if !self.supports_layout(layout) {
            return Err(GraphicsError::UnsupportedConfiguration(format!(
                "layout {layout:?} is not realizable"
            )));
        }
        log(&self.events, "create device");
        let events = Rc::clone(&self.events);
        ledger.push("mock device", move || {
            log(&events, "destroy device");
            Ok(())
        });
        Ok(Box::new(MockDevice {
            events: Rc::clone(&self.events),
            frame_open: Rc::new(RefCell::new(false)),
        }))
    }
}

struct MockDevice {
    events: EventLog,
    frame_open: Rc<RefCell<bool>>,
}

impl GpuDevice for MockDevice {
    fn attach_presentation(
        &mut self,
        _target: &dyn PresentationTarget,
        _layout: &SwapchainLayout,
        _extent: SurfaceExtent,
        _ledger: &mut ResourceLedger,
    ) -> Result<()> {
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    fn create_command_buffer(
        &mut self,
        ledger: &mut ResourceLedger,
    ) -> Result<Box<dyn GpuCommandBuffer>> {
        log(&self.events, "create command buffer");
        let events = Rc::clone(&self.events);
        ledger.push("mock command buffer", move || {
            log(&events, "free command buffer");
            Ok(())
        });
        Ok(Box::new(MockCommandBuffer {
            events: Rc::clone(&self.events),
            recording: false,
        }))
    }

    fn begin_frame(&mut self, _blocking: bool) -> Result<Box<dyn GpuFrame>> {
        if *self.frame_open.borrow() {
            return Err(GraphicsError::InvalidState(
                "previous frame still open".to_string(),
            ));
        }
        *self.frame_open.borrow_mut() = true;
        log(&self.events, "begin frame");
        Ok(Box::new(MockFrame { image_index: 0 }))
    }

    fn end_frame(&mut self, frame: Box<dyn GpuFrame>, _blocking: bool) -> Result<()> {
        let frame = frame
            .as_any()
            .downcast_ref::<MockFrame>()
            .expect("foreign frame handed to mock device");
        if !*self.frame_open.borrow() {
            return Err(GraphicsError::InvalidState(
                "end_frame without an open frame".to_string(),
            ));
        }
        *self.frame_open.borrow_mut() = false;
        log(&self.events, format!("end frame {}", frame.image_index));
        Ok(())
    }
}

struct MockCommandBuffer {
    events: EventLog,
    recording: bool,
}

impl GpuCommandBuffer for MockCommandBuffer {
    fn reset(&mut self) -> Result<()> {
        self.recording = true;
        log(&self.events, "reset");
        Ok(())
    }

    fn clear(&mut self, _frame: &dyn GpuFrame, color: Color) -> Result<()> {
        if !self.recording {
            return Err(GraphicsError::InvalidState(
                "clear recorded outside a recording cycle".to_string(),
            ));
        }
        log(&self.events, format!("clear {:?}", color.to_array()));
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        if !self.recording {
            return Err(GraphicsError::InvalidState(
                "submit without a prior reset".to_string(),
            ));
        }
        self.recording = false;
        log(&self.events, "submit");
        Ok(())
    }
}

struct MockFrame {
    image_index: u32,
}

impl GpuFrame for MockFrame {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The application init sequence, as the shell performs it.
fn init_graphics(
    provider: &dyn GpuProvider,
    layout: DeviceLayout,
    ledger: &mut ResourceLedger,
) -> Result<(Box<dyn GpuDevice>, Box<dyn GpuCommandBuffer>)> {
    if !provider.is_supported() {
        return Err(GraphicsError::UnsupportedConfiguration(format!(
            "provider {} is not supported on this system",
            provider.name()
        )));
    }
    let instance = provider.create_instance(ledger)?;
    if !instance.supports_layout(layout) {
        return Err(GraphicsError::UnsupportedConfiguration(format!(
            "provider {} cannot realize layout {layout:?}",
            provider.name()
        )));
    }
    let mut device = instance.create_device(layout, ledger)?;
    let command_buffer = device.create_command_buffer(ledger)?;
    Ok((device, command_buffer))
}

#[test]
fn full_lifecycle_clear_frame() {
    let events: EventLog = Rc::default();
    let provider = MockProvider {
        supported: true,
        events: Rc::clone(&events),
    };
    let mut ledger = ResourceLedger::new();

    let (mut device, mut cmd) =
        init_graphics(&provider, DeviceLayout::SimpleDeferred, &mut ledger).unwrap();

    let frame = device.begin_frame(true).unwrap();
    cmd.reset().unwrap();
    cmd.clear(frame.as_ref(), Color::RED).unwrap();
    cmd.submit().unwrap();
    device.end_frame(frame, true).unwrap();

    ledger.unwind_all().unwrap();

    assert_eq!(
        *events.borrow(),
        vec![
            "create instance",
            "create device",
            "create command buffer",
            "begin frame",
            "reset",
            "clear [1.0, 0.0, 0.0, 1.0]",
            "submit",
            "end frame 0",
            // Reverse acquisition order.
            "free command buffer",
            "destroy device",
            "destroy instance",
        ]
    );
}

#[test]
fn unsupported_provider_acquires_nothing() {
    let events: EventLog = Rc::default();
    let provider = MockProvider {
        supported: false,
        events,
    };
    let mut ledger = ResourceLedger::new();

    let err = init_graphics(&provider, DeviceLayout::SimpleDeferred, &mut ledger).unwrap_err();
    assert!(matches!(err, GraphicsError::UnsupportedConfiguration(_)));
    assert!(ledger.is_empty());
}

#[test]
fn unsupported_layout_is_rejected_by_create_device() {
    let events: EventLog = Rc::default();
    let provider = MockProvider {
        supported: true,
        events,
    };
    let mut ledger = ResourceLedger::new();

    // Skip the supports_layout check to exercise the defensive re-validation.
    let instance = provider.create_instance(&mut ledger).unwrap();
    let err = instance
        .create_device(DeviceLayout::SimpleForward, &mut ledger)
        .unwrap_err();
    assert!(matches!(err, GraphicsError::UnsupportedConfiguration(_)));

    // Only the instance acquisition happened before the failure.
    assert_eq!(ledger.len(), 1);
    ledger.unwind_all().unwrap();
}

#[test]
fn second_begin_before_end_is_rejected() {
    let events: EventLog = Rc::default();
    let provider = MockProvider {
        supported: true,
        events,
    };
    let mut ledger = ResourceLedger::new();

    let (mut device, _) =
        init_graphics(&provider, DeviceLayout::SimpleDeferred, &mut ledger).unwrap();

    let frame = device.begin_frame(true).unwrap();
    let err = device.begin_frame(true).unwrap_err();
    assert!(matches!(err, GraphicsError::InvalidState(_)));

    // The open frame can still be presented normally.
    device.end_frame(frame, true).unwrap();
    ledger.unwind_all().unwrap();
}

#[test]
fn end_frame_without_begin_is_rejected() {
    let events: EventLog = Rc::default();
    let provider = MockProvider {
        supported: true,
        events,
    };
    let mut ledger = ResourceLedger::new();

    let (mut device, _) =
        init_graphics(&provider, DeviceLayout::SimpleDeferred, &mut ledger).unwrap();

    let err = device
        .end_frame(Box::new(MockFrame { image_index: 0 }), true)
        .unwrap_err();
    assert!(matches!(err, GraphicsError::InvalidState(_)));

    ledger.unwind_all().unwrap();
}

#[test]
fn submit_without_reset_is_rejected() {
    let events: EventLog = Rc::default();
    let provider = MockProvider {
        supported: true,
        events,
    };
    let mut ledger = ResourceLedger::new();

    let (_, mut cmd) =
        init_graphics(&provider, DeviceLayout::SimpleDeferred, &mut ledger).unwrap();
    let err = cmd.submit().unwrap_err();
    assert!(matches!(err, GraphicsError::InvalidState(_)));

    ledger.unwind_all().unwrap();
}
