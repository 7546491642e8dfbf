use anyhow::{Context, Result, anyhow, bail};
use newsgraph_core::{EntityId, EntityType, RelationshipId};

/// One line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load,
    Expand(EntityId),
    More(EntityId),
    Ego,
    Collapse(EntityId),
    ToggleNode(EntityId),
    ToggleEdge(RelationshipId),
    SelectName(String),
    UnselectName(String),
    Clear,
    Merge(EntityId, Vec<EntityId>),
    MergeSelected(EntityId),
    Hide,
    Rename(EntityId, String),
    Retype(EntityId, EntityType),
    Note(String),
    Show,
    Selection,
    Words,
    Help,
    Quit,
}

pub const HELP: &str = "\
load                      reload the full graph
expand <id>               fetch the ego network of a node
more <id>                 fetch more neighbours of a node
ego                       expand the last selected node
collapse <id>             undo an expansion
node <id> | edge <id>     toggle selection
select <name>             select all nodes with a name (looked up if absent)
unselect <name>           unselect all nodes with a name
clear                     clear the selection
merge <focal> <id>...     merge nodes into the focal node
merge-selected <focal>    merge the selection into one of its nodes
hide                      remove the selection from the graph
rename <id> <name>        edit a node's name
retype <id> <LOC|ORG|PER|MISC>
note <text>               annotate the selected node or edge
show | selection | words  print graph, selection or highlight words
help | quit";

fn id(token: Option<&str>) -> Result<i64> {
    let token = token.ok_or_else(|| anyhow!("missing id"))?;
    token
        .parse()
        .with_context(|| format!("invalid id {token:?}"))
}

fn rest(line: &str, verb: &str) -> Result<String> {
    let text = line[verb.len()..].trim();
    if text.is_empty() {
        bail!("{verb} needs an argument");
    }
    Ok(text.to_string())
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let mut tokens = line.split_whitespace();
        let Some(verb) = tokens.next() else {
            bail!("empty command");
        };

        let command = match verb {
            "load" => Command::Load,
            "expand" => Command::Expand(EntityId(id(tokens.next())?)),
            "more" => Command::More(EntityId(id(tokens.next())?)),
            "ego" => Command::Ego,
            "collapse" => Command::Collapse(EntityId(id(tokens.next())?)),
            "node" => Command::ToggleNode(EntityId(id(tokens.next())?)),
            "edge" => Command::ToggleEdge(RelationshipId(id(tokens.next())?)),
            "select" => Command::SelectName(rest(line, verb)?),
            "unselect" => Command::UnselectName(rest(line, verb)?),
            "clear" => Command::Clear,
            "merge" => {
                let focal = EntityId(id(tokens.next())?);
                let ids = tokens
                    .map(|t| id(Some(t)).map(EntityId))
                    .collect::<Result<Vec<_>>>()?;
                if ids.is_empty() {
                    bail!("merge needs at least one id besides the focal one");
                }
                Command::Merge(focal, ids)
            }
            "merge-selected" => Command::MergeSelected(EntityId(id(tokens.next())?)),
            "hide" => Command::Hide,
            "rename" => {
                let target = EntityId(id(tokens.next())?);
                let name = tokens.collect::<Vec<_>>().join(" ");
                if name.is_empty() {
                    bail!("rename needs a name");
                }
                Command::Rename(target, name)
            }
            "retype" => {
                let target = EntityId(id(tokens.next())?);
                let code = tokens.next().ok_or_else(|| anyhow!("retype needs a type"))?;
                Command::Retype(target, EntityType::try_from(code)?)
            }
            "note" => Command::Note(rest(line, verb)?),
            "show" => Command::Show,
            "selection" => Command::Selection,
            "words" => Command::Words,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command {other:?}, try `help`"),
        };
        Ok(command)
    }
}
