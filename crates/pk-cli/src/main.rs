//! pk - panelkit command line
//!
//! Inspects, solves and drags panelkit project files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::DVec3;
use pk_core::{Corner, DriverConfig, Project, SolveDriver, VertexRef};
use pk_sketch::SolveResult;

#[derive(Parser)]
#[command(name = "pk")]
#[command(about = "Solve panel and beam assemblies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the parts and constraints of a project
    Info {
        /// Project file (.ron)
        file: PathBuf,
    },
    /// Solve a project and write the result back
    Solve {
        /// Project file (.ron)
        file: PathBuf,
        /// Where to write the solved project (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Driver configuration file (.ron)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Drag one corner to a target position, then solve
    Drag {
        /// Project file (.ron)
        file: PathBuf,
        /// Name of the part owning the corner
        #[arg(long)]
        part: String,
        /// Corner index (x + 2y + 4z)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..8))]
        corner: u8,
        /// Target world position as x,y,z
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        to: DVec3,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// A corner to drag and where to
struct Drag {
    part: String,
    corner: Corner,
    target: DVec3,
}

fn main() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pk_cli=info,pk_core=info,pk_sketch=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { file } => {
            show_info(&file)?;
        }
        Commands::Solve {
            file,
            output,
            config,
        } => {
            run(&file, output, config, None)?;
        }
        Commands::Drag {
            file,
            part,
            corner,
            to,
            output,
            config,
        } => {
            let corner = Corner::new(corner).context("corner index must be below 8")?;
            let drag = Drag {
                part,
                corner,
                target: to,
            };
            run(&file, output, config, Some(drag))?;
        }
    }

    Ok(())
}

fn show_info(file: &Path) -> Result<()> {
    let project = Project::load(file).with_context(|| format!("loading {}", file.display()))?;

    println!("Project: {} (version {})", project.name, project.version);
    println!("Parts: {}", project.parts.len());
    for (i, part) in project.parts.iter().enumerate() {
        let p = part.position();
        let s = part.size();
        println!(
            "  [{i}] {} {}: position ({:.3}, {:.3}, {:.3}) size ({:.3}, {:.3}, {:.3})",
            part.kind().name(),
            part.name,
            p.x,
            p.y,
            p.z,
            s.x,
            s.y,
            s.z
        );
    }
    println!("Constraints: {}", project.constraints.len());
    for (a, b) in &project.constraints {
        let name = |index: usize| {
            project
                .parts
                .get(index)
                .map_or("?", |part| part.name.as_str())
        };
        println!(
            "  {}{} == {}{}",
            name(a.part),
            a.corner,
            name(b.part),
            b.corner
        );
    }
    Ok(())
}

fn run(
    file: &Path,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    drag: Option<Drag>,
) -> Result<()> {
    let project = Project::load(file).with_context(|| format!("loading {}", file.display()))?;
    let config = match config {
        Some(path) => DriverConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DriverConfig::default(),
    };

    let (solved, result) = solve_project(project, config, drag)?;
    tracing::info!("Solve result: {}", result);

    let output = output.unwrap_or_else(|| file.to_path_buf());
    solved
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("{} -> {}", result, output.display());
    Ok(())
}

/// Solve a project, optionally dragging one corner, and return the result
fn solve_project(
    project: Project,
    config: DriverConfig,
    drag: Option<Drag>,
) -> Result<(Project, SolveResult)> {
    let name = project.name.clone();
    let (mut model, _) = project.into_model()?;

    let dragged = match &drag {
        Some(drag) => {
            let part = model
                .find_part(&drag.part)
                .with_context(|| format!("no part named '{}'", drag.part))?;
            vec![VertexRef::new(part, drag.corner)]
        }
        None => Vec::new(),
    };

    let mut driver = SolveDriver::with_config(config);
    driver
        .build_sketch(&model, &dragged)
        .context("building the sketch")?;
    if let (Some(drag), Some(&vertex)) = (&drag, dragged.first()) {
        driver.drag_vertex(vertex, drag.target)?;
        tracing::info!("Dragging {} corner {} to {}", drag.part, drag.corner, drag.target);
    }
    let result = driver.solve().context("solving")?;
    driver.apply(&mut model).context("applying the solution")?;

    Ok((Project::from_model(name, &model), result))
}

/// Parse `x,y,z` into a point
fn parse_point(s: &str) -> Result<DVec3, String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|e| format!("'{c}': {e}")))
        .collect::<Result<Vec<f64>, String>>()?;
    match coords[..] {
        [x, y, z] => Ok(DVec3::new(x, y, z)),
        _ => Err(format!("expected x,y,z, got {} values", coords.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pk_core::{Model, Part, SolverError};

    fn two_panels(gap: f64) -> Project {
        let mut model = Model::new();
        let a = model.add_part(Part::panel("left", DVec3::new(100.0, 50.0, 10.0)));
        let b = model.add_part(
            Part::panel("right", DVec3::new(100.0, 50.0, 10.0))
                .with_position(DVec3::new(100.0 + gap, 0.0, 0.0)),
        );
        model
            .add_constraint(
                VertexRef::new(a, Corner::new(1).unwrap()),
                VertexRef::new(b, Corner::ORIGIN),
            )
            .unwrap();
        Project::from_model("pair", &model)
    }

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("1, -2.5,3").unwrap(), DVec3::new(1.0, -2.5, 3.0));
        assert!(parse_point("1,2").is_err());
        assert!(parse_point("1,2,x").is_err());
    }

    #[test]
    fn test_solve_closes_gap() {
        let (solved, result) = solve_project(two_panels(4.0), DriverConfig::default(), None).unwrap();
        assert!(result.is_ok());

        let (model, ids) = solved.into_model().unwrap();
        let left = model.part(ids[0]).unwrap().vertex_position(Corner::new(1).unwrap());
        let right = model.part(ids[1]).unwrap().vertex_position(Corner::ORIGIN);
        assert!(left.abs_diff_eq(right, 1e-6));
    }

    #[test]
    fn test_drag_corner() {
        let drag = Drag {
            part: "right".into(),
            corner: Corner::FAR,
            target: DVec3::new(230.0, 60.0, 10.0),
        };
        let (solved, _) = solve_project(two_panels(0.0), DriverConfig::default(), Some(drag)).unwrap();

        let right = &solved.parts[1];
        assert!(right
            .vertex_position(Corner::FAR)
            .abs_diff_eq(DVec3::new(230.0, 60.0, 10.0), 1e-6));
    }

    #[test]
    fn test_unknown_part() {
        let drag = Drag {
            part: "missing".into(),
            corner: Corner::ORIGIN,
            target: DVec3::ZERO,
        };
        assert!(solve_project(two_panels(0.0), DriverConfig::default(), Some(drag)).is_err());
    }

    #[test]
    fn test_failed_solve_is_an_error() {
        let mut model = Model::new();
        let a = model.add_part(Part::panel("thin", DVec3::new(10.0, 10.0, 1.0)));
        let b = model.add_part(Part::panel("thick", DVec3::new(10.0, 10.0, 2.0)));
        for index in [0, 4] {
            let corner = Corner::new(index).unwrap();
            model
                .add_constraint(VertexRef::new(a, corner), VertexRef::new(b, corner))
                .unwrap();
        }
        let project = Project::from_model("conflict", &model);

        let err = solve_project(project, DriverConfig::default(), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SolverError>(),
            Some(SolverError::SolveFailure(_))
        ));
    }
}
