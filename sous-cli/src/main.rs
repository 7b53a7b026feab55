//! sous-cli: terminal front end for the SousChef server
//!
//! Runs the recipe chat locally through `ChefSession`, with every model,
//! parsing, nutrition and storage call going to the server over HTTP.
//!
//! # Subcommands
//! - `status`                               show server health
//! - `chat [--session <id>]`                recipe chat (`/save`, `/quit`)
//! - `cook <recipe-id>`                     cooking help for a saved recipe
//! - `recipes [--public]`                   list your recipes or the public ones
//! - `show <recipe-id>` / `delete <recipe-id>`
//! - `meal <name> --protein --carbs --fats`: log a meal
//! - `meals [-n <limit>]`                   recent meals
//! - `today [--date <YYYY-MM-DD>]`          intake vs goals
//! - `goals [--protein ...]`                show or update goals

mod client;

use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use sous_core::models::{
    CandidateRecipe, ChatEntry, GoalsUpdate, MealLog, NewMeal, NutritionGoals, PersistedRecipe,
};
use sous_core::{ChefSession, RecipeCollection, RecipeStore, Submitter, TurnOutcome};

use client::{IntakeReport, ServerClient};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const DEFAULT_MEAL_LIMIT: i64 = 20;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "sous-cli", version, about = "SousChef: recipe chat and macro tracking")]
struct Cli {
    /// SousChef HTTP server URL (overrides SOUS_HTTP_URL env var)
    #[arg(long, env = "SOUS_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Session token sent as the `sous_session` cookie
    #[arg(long, env = "SOUS_SESSION_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Your user id
    #[arg(long, env = "SOUS_USER_ID")]
    user: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server status
    Status,

    /// Chat with the sous-chef to create a recipe
    Chat {
        /// Keep the conversation in the server's chat log under this id
        #[arg(long)]
        session: Option<String>,
    },

    /// Get cooking help for a saved recipe
    Cook {
        id: Uuid,

        #[arg(long)]
        session: Option<String>,
    },

    /// List recipes
    Recipes {
        /// List public recipes instead of your own
        #[arg(long)]
        public: bool,
    },

    /// Show one recipe
    Show { id: Uuid },

    /// Delete one of your recipes
    Delete { id: Uuid },

    /// Log a meal against today's intake
    Meal {
        name: String,

        #[arg(long)]
        protein: f64,

        #[arg(long)]
        carbs: f64,

        #[arg(long)]
        fats: f64,

        #[arg(long)]
        calories: Option<f64>,

        #[arg(long)]
        servings: Option<f64>,

        /// Recipe the meal was cooked from
        #[arg(long)]
        recipe: Option<Uuid>,
    },

    /// List recent meals
    Meals {
        #[arg(short = 'n', long, default_value_t = DEFAULT_MEAL_LIMIT)]
        limit: i64,
    },

    /// Show intake against goals for a day (today by default)
    Today {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show goals, or update the targets given
    Goals {
        #[arg(long)]
        protein: Option<f64>,

        #[arg(long)]
        carbs: Option<f64>,

        #[arg(long)]
        fats: Option<f64>,

        #[arg(long)]
        calories: Option<f64>,
    },
}

// ============================================================================
// Rendering
// ============================================================================

pub fn format_candidate(recipe: &CandidateRecipe) -> String {
    let mut out = String::new();
    out.push_str(&format!("## {}\n", recipe.title));
    if let Some(desc) = &recipe.description {
        out.push_str(&format!("{desc}\n"));
    }
    out.push_str(&format_times(recipe.prep_time, recipe.cook_time, recipe.servings));
    out.push_str("\nIngredients:\n");
    for i in &recipe.ingredients {
        out.push_str(&format_ingredient(&i.name, &i.amount));
    }
    out.push_str("\nInstructions:\n");
    for (n, step) in recipe.instructions.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", n + 1, step.text()));
    }
    out
}

pub fn format_recipe(recipe: &PersistedRecipe) -> String {
    let emoji = recipe.notes.emoji.as_deref().unwrap_or("");
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", emoji, recipe.title).trim_start().to_string());
    out.push_str(&format!("id: {}\n", recipe.id));
    if let Some(desc) = &recipe.description {
        out.push_str(&format!("{desc}\n"));
    }
    out.push_str(&format_times(recipe.prep_time, recipe.cook_time, recipe.servings));
    if let Some(n) = &recipe.nutrition {
        out.push_str(&format!(
            "Nutrition: {:.0} kcal · P {:.0}g · C {:.0}g · F {:.0}g\n",
            n.calories, n.protein, n.carbs, n.fats
        ));
    }
    out.push_str("\nIngredients:\n");
    for i in &recipe.ingredients {
        out.push_str(&format_ingredient(&i.name, &i.amount));
    }
    out.push_str("\nInstructions:\n");
    for (n, step) in recipe.instructions.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", n + 1, step.text()));
    }
    if let Some(text) = &recipe.notes.text {
        out.push_str(&format!("\nNotes: {text}\n"));
    }
    out
}

fn format_ingredient(name: &str, amount: &str) -> String {
    if amount.is_empty() {
        format!("  - {name}\n")
    } else {
        format!("  - {amount} {name}\n")
    }
}

fn format_times(prep: Option<i32>, cook: Option<i32>, servings: Option<i32>) -> String {
    let parts: Vec<String> = [
        prep.map(|m| format!("prep {m} min")),
        cook.map(|m| format!("cook {m} min")),
        servings.map(|s| format!("serves {s}")),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("{}\n", parts.join(" · "))
    }
}

pub fn format_intake(report: &IntakeReport) -> String {
    let i = &report.intake;
    let g = &report.goals;
    let r = &report.remaining;
    let mut out = format!("Intake for {}\n", report.date);
    out.push_str(&macro_line("Protein", i.protein_consumed, g.protein_target, r.protein));
    out.push_str(&macro_line("Carbs", i.carbs_consumed, g.carbs_target, r.carbs));
    out.push_str(&macro_line("Fats", i.fats_consumed, g.fats_target, r.fats));
    if let (Some(target), Some(left)) = (g.calories_target, r.calories) {
        out.push_str(&macro_line(
            "Calories",
            i.calories_consumed.unwrap_or(0.0),
            target,
            left,
        ));
    }
    out
}

fn macro_line(label: &str, consumed: f64, target: f64, remaining: f64) -> String {
    if remaining < 0.0 {
        format!(
            "  {label:<9} {consumed:>6.0} / {target:.0}  ({:.0} over)\n",
            -remaining
        )
    } else {
        format!("  {label:<9} {consumed:>6.0} / {target:.0}  ({remaining:.0} left)\n")
    }
}

fn format_goals(goals: &NutritionGoals) -> String {
    let mut out = format!(
        "Protein {:.0}g · Carbs {:.0}g · Fats {:.0}g",
        goals.protein_target, goals.carbs_target, goals.fats_target
    );
    if let Some(cal) = goals.calories_target {
        out.push_str(&format!(" · {cal:.0} kcal"));
    }
    out
}

fn format_meal(meal: &MealLog) -> String {
    format!(
        "{}  {}  P {:.0}g · C {:.0}g · F {:.0}g",
        meal.consumed_at.format("%Y-%m-%d %H:%M"),
        meal.meal_name,
        meal.protein_consumed,
        meal.carbs_consumed,
        meal.fats_consumed
    )
}

// ============================================================================
// Commands
// ============================================================================

fn require_user(user: Option<Uuid>) -> anyhow::Result<Uuid> {
    user.ok_or_else(|| anyhow!("this command needs --user (or SOUS_USER_ID)"))
}

async fn do_status(client: &ServerClient) -> anyhow::Result<()> {
    let body = client
        .health()
        .await
        .with_context(|| format!("cannot reach {}", client.base_url()))?;
    println!("SousChef server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
    println!("Storage:         {}", body["storage"].as_str().unwrap_or("?"));
    println!("Chat backend:    {}", body["chat_backend"].as_str().unwrap_or("?"));
    Ok(())
}

fn new_session(client: &ServerClient, user: Option<Uuid>, session: Option<String>) -> ChefSession {
    let shared = Arc::new(client.clone());
    let submitter = Submitter::new(shared.clone(), shared.clone(), RecipeCollection::new());
    let chef = ChefSession::new(shared.clone(), shared, submitter, user);
    match session {
        Some(id) => chef.with_session_id(id),
        None => chef,
    }
}

async fn do_chat(mut chef: ChefSession) -> anyhow::Result<()> {
    eprintln!("Type a message. /save stores the last recipe, /quit leaves.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/save" => match chef.save().await {
                Ok(saved) => {
                    println!("{}", sous_core::chef::recipe_saved_message(&saved.title));
                    println!("id: {}", saved.id);
                }
                Err(e) => eprintln!("{}", e.user_message()),
            },
            text => match chef.send(text).await {
                Ok(TurnOutcome::Conversation(reply)) => println!("{reply}\n"),
                Ok(TurnOutcome::RecipeReady(recipe)) => {
                    if let Some(ChatEntry::Message(m)) = chef.entries().last() {
                        println!("{}\n", m.content);
                    }
                    println!("{}", format_candidate(&recipe));
                    println!("Type /save to keep it.\n");
                }
                Ok(TurnOutcome::RecipeRejected(reason)) => {
                    if let Some(ChatEntry::Message(m)) = chef.entries().last() {
                        println!("{}\n", m.content);
                    }
                    tracing::debug!(reason = %reason, "Recipe rejected");
                }
                Err(e) => eprintln!("{}", e.user_message()),
            },
        }
    }
    Ok(())
}

async fn do_cook(
    client: &ServerClient,
    user: Option<Uuid>,
    id: Uuid,
    session: Option<String>,
) -> anyhow::Result<()> {
    let recipe = client
        .get_recipe(id)
        .await?
        .ok_or_else(|| anyhow!("recipe {id} not found"))?;

    let mut chef = new_session(client, user, session);
    chef.begin_cooking(&recipe);
    println!("{}", format_recipe(&recipe));
    println!("--- {} ---", sous_core::chef::COOKING_SESSION_LABEL);
    do_chat(chef).await
}

async fn do_recipes(client: &ServerClient, user: Option<Uuid>, public: bool) -> anyhow::Result<()> {
    let owner = if public { None } else { Some(require_user(user)?) };
    let recipes = client.list_recipes(owner).await?;
    if recipes.is_empty() {
        eprintln!("No recipes yet.");
        return Ok(());
    }
    for r in &recipes {
        println!(
            "{}  {} {}",
            r.id,
            r.notes.emoji.as_deref().unwrap_or(" "),
            r.title
        );
    }
    Ok(())
}

async fn do_show(client: &ServerClient, id: Uuid) -> anyhow::Result<()> {
    let recipe = client
        .get_recipe(id)
        .await?
        .ok_or_else(|| anyhow!("recipe {id} not found"))?;
    print!("{}", format_recipe(&recipe));
    Ok(())
}

async fn do_delete(client: &ServerClient, id: Uuid) -> anyhow::Result<()> {
    if client.delete_recipe(id).await? {
        println!("Deleted {id}");
        Ok(())
    } else {
        Err(anyhow!("recipe {id} not found"))
    }
}

async fn do_meals(client: &ServerClient, user: Uuid, limit: i64) -> anyhow::Result<()> {
    let meals = client.list_meals(user, limit).await?;
    if meals.is_empty() {
        eprintln!("No meals logged.");
    }
    for m in &meals {
        println!("{}", format_meal(m));
    }
    Ok(())
}

async fn do_goals(client: &ServerClient, user: Uuid, update: GoalsUpdate) -> anyhow::Result<()> {
    let changed = update != GoalsUpdate::default();
    let goals = if changed {
        client.update_goals(user, &update).await?
    } else {
        client.goals(user).await?
    };
    println!("{}", format_goals(&goals));
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = ServerClient::new(&cli.server, cli.token.clone())?;
    let user = cli.user;

    match cli.command {
        Commands::Status => do_status(&client).await,
        Commands::Chat { session } => do_chat(new_session(&client, user, session)).await,
        Commands::Cook { id, session } => do_cook(&client, user, id, session).await,
        Commands::Recipes { public } => do_recipes(&client, user, public).await,
        Commands::Show { id } => do_show(&client, id).await,
        Commands::Delete { id } => do_delete(&client, id).await,
        Commands::Meal {
            name,
            protein,
            carbs,
            fats,
            calories,
            servings,
            recipe,
        } => {
            let meal = NewMeal {
                user_id: require_user(user)?,
                recipe_id: recipe,
                meal_name: name,
                servings,
                protein,
                carbs,
                fats,
                calories,
                consumed_at: None,
            };
            meal.validate().map_err(|e| anyhow!(e))?;
            let logged = client.log_meal(&meal).await?;
            println!("Logged {}", format_meal(&logged.meal));
            println!(
                "Today so far: P {:.0}g · C {:.0}g · F {:.0}g",
                logged.intake.protein_consumed,
                logged.intake.carbs_consumed,
                logged.intake.fats_consumed
            );
            Ok(())
        }
        Commands::Meals { limit } => do_meals(&client, require_user(user)?, limit).await,
        Commands::Today { date } => {
            let report = client.intake(require_user(user)?, date).await?;
            print!("{}", format_intake(&report));
            Ok(())
        }
        Commands::Goals {
            protein,
            carbs,
            fats,
            calories,
        } => {
            let update = GoalsUpdate {
                protein_target: protein,
                carbs_target: carbs,
                fats_target: fats,
                calories_target: calories,
            };
            do_goals(&client, require_user(user)?, update).await
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<sous_core::SousError>() {
            Some(err) => eprintln!("sous-cli: {}", err.user_message()),
            None => eprintln!("sous-cli: {:#}", e),
        }
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
