use crate::models::Poll;
use serde::Serialize;

/// One option's share of the vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub option: String,
    pub votes: u64,
    /// Percentage of all votes, 0.0 when nobody has voted.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResults {
    pub total_votes: u64,
    /// Most votes first; ties keep the poll's option order.
    pub standings: Vec<Standing>,
    /// `None` while there are no votes or the top spot is tied.
    pub leader: Option<String>,
}

impl PollResults {
    pub fn from_poll(poll: &Poll) -> Self {
        let total_votes = poll.total_votes();

        let mut standings: Vec<Standing> = poll
            .options
            .iter()
            .map(|option| {
                let votes = poll.votes_for(option);
                let share = if total_votes == 0 {
                    0.0
                } else {
                    votes as f64 * 100.0 / total_votes as f64
                };
                Standing {
                    option: option.clone(),
                    votes,
                    share,
                }
            })
            .collect();
        // Stable sort, so equal counts stay in option order.
        standings.sort_by(|a, b| b.votes.cmp(&a.votes));

        let leader = match standings.as_slice() {
            [first, second, ..] if first.votes > second.votes => Some(first.option.clone()),
            [only] if only.votes > 0 => Some(only.option.clone()),
            _ => None,
        };

        Self {
            total_votes,
            standings,
            leader,
        }
    }

    /// Plain-text rendering, leader in bold.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        for standing in &self.standings {
            let line = format!(
                "{}: {} votes ({:.1}%)",
                standing.option, standing.votes, standing.share
            );
            if self.leader.as_deref() == Some(standing.option.as_str()) {
                summary.push_str(&format!("**{}**", line));
            } else {
                summary.push_str(&line);
            }
            summary.push('\n');
        }
        summary.push_str(&format!("\n{} voters participated.", self.total_votes));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll_with(votes: &[(&str, u64)]) -> Poll {
        let labels: Vec<&str> = votes.iter().map(|(label, _)| *label).collect();
        let mut poll = Poll::new("Lunch choice?", &labels).unwrap();
        for (label, count) in votes {
            poll.tally.insert(label.to_string(), *count);
        }
        poll
    }

    #[test]
    fn standings_are_sorted_with_shares() {
        let results = PollResults::from_poll(&poll_with(&[("Pizza", 1), ("Salad", 3)]));
        assert_eq!(results.total_votes, 4);
        assert_eq!(results.standings[0].option, "Salad");
        assert_eq!(results.standings[0].share, 75.0);
        assert_eq!(results.standings[1].share, 25.0);
        assert_eq!(results.leader.as_deref(), Some("Salad"));
    }

    #[test]
    fn no_votes_means_no_leader() {
        let results = PollResults::from_poll(&poll_with(&[("Pizza", 0), ("Salad", 0)]));
        assert_eq!(results.leader, None);
        assert_eq!(results.standings[0].option, "Pizza");
        assert_eq!(results.standings[0].share, 0.0);
    }

    #[test]
    fn tie_at_the_top_means_no_leader() {
        let results = PollResults::from_poll(&poll_with(&[("Pizza", 2), ("Salad", 2), ("Tacos", 1)]));
        assert_eq!(results.leader, None);
        assert_eq!(results.standings[2].option, "Tacos");
    }

    #[test]
    fn summary_marks_the_leader() {
        let results = PollResults::from_poll(&poll_with(&[("Pizza", 1), ("Salad", 0)]));
        let summary = results.summary();
        assert!(summary.starts_with("**Pizza: 1 votes (100.0%)**\n"));
        assert!(summary.ends_with("1 voters participated."));
    }
}
