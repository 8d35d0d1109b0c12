//! Windowed shell: winit event loop wiring the engine and the inspector.

use std::sync::Arc;

use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::gui::Gui;
use crate::EngineConfig;

/// Build the window and engine, then hand both to `setup` for scene
/// population before the frame loop starts.
pub fn run(
    config: EngineConfig,
    setup: impl FnOnce(&mut Engine) -> EngineResult<()>,
) -> EngineResult<()> {
    env_logger::init();

    let event_loop = EventLoop::new()
        .map_err(|e| EngineError::SurfaceCreation(format!("event loop: {e}")))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .build(&event_loop)
            .map_err(|e| EngineError::SurfaceCreation(format!("window: {e}")))?,
    );

    let mut engine = Engine::new(Arc::clone(&window), &config)?;
    let mut gui = Gui::new(engine.device(), engine.surface_format(), &window);
    setup(&mut engine)?;

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    let consumed = gui.on_window_event(&window, &event);

                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::Resized(size) => {
                            engine.resize(size.width, size.height);
                        }
                        WindowEvent::RedrawRequested => {
                            engine.update();
                            gui.run(&window, &mut engine);

                            let (width, height) = engine.display_size();
                            let result = engine.render(|device, queue, encoder, view| {
                                gui.render(device, queue, encoder, view, width, height);
                            });
                            if let Err(err) = result {
                                log::error!("frame failed: {err}");
                                elwt.exit();
                            }
                        }
                        _ => {
                            let _ = consumed;
                        }
                    }
                }
                Event::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|e| EngineError::SurfaceCreation(format!("event loop: {e}")))
}
