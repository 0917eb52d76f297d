use std::fs;

use nalgebra::DVector;
use plotters::prelude::*;

extern crate cartpend;
use cartpend::control::{feedback, pid, sample_impulse_response, to_degrees};
use cartpend::model::{CartPole, PhysicalParams};
use cartpend::response::{time_response, InputTransform};
use cartpend::symtf::SymbolicTransferFunction;
use cartpend::tf::TransferFunction;

fn plot(
    x: &DVector<f64>,
    y: &DVector<f64>,
    (w, h): (u32, u32),
    path: &str,
    title: &str,
    x_label: &str,
    y_label: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (w, h)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30, FontStyle::Normal).into_font())
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(x.min()..x.max(), y.min()..y.max())?;

    let label_font_x = ("sans-serif", 25, FontStyle::Normal).into_font();
    let label_font_y = ("sans-serif", 25, FontStyle::Normal).into_font();
    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .x_label_style(label_font_x)
        .y_label_style(label_font_y)
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            x.iter().copied().zip(y.iter().copied()),
            Palette99::pick(3).stroke_width(2),
        ))?
        .label(title)
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], Palette99::pick(3)));

    root.present()?;

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Linearize the cart-pole about the upright equilibrium.
    let model = CartPole::new();
    let gains = model.linearize()?;
    let symbols = model.symbols();
    let params = PhysicalParams::default();

    // Symbolic open-loop responses of the angle to the three inputs.
    let angle_plant = SymbolicTransferFunction::force_to_angle(&gains);
    let time = cartpend::expr::Symbol::new("t");
    for (name, input) in [
        ("impulse", InputTransform::Impulse),
        ("step", InputTransform::Step),
        (
            "sinusoid",
            InputTransform::Sinusoid {
                omega: cartpend::expr::Expr::num(2),
            },
        ),
    ] {
        let response = time_response(&angle_plant, &input, &time)?;
        println!("theta {} response: {}", name, response);
    }

    // Close the loop with the PID controller and sample the disturbance
    // rejection over one second.
    let numeric = gains.eval(symbols, &params)?;
    let plant = TransferFunction::force_to_angle(&numeric)?;
    let controller = -&pid(125.0, 0.2, 9.0);
    let closed = feedback(&plant, &controller)?;
    let (t, y) = sample_impulse_response(&closed, 0.0, 1.0, 500)?;
    let degrees = to_degrees(&y);

    let plot_dir = "demos/plots";
    if !std::path::Path::new(plot_dir).exists() {
        fs::create_dir_all(plot_dir)?;
    }

    plot(
        &t,
        &degrees,
        (1200, 600),
        &format!("{}/disturbance_response.png", plot_dir),
        "stabilized rod angle after a force impulse",
        "time [s]",
        "angle [deg]",
    )?;

    Ok(())
}
